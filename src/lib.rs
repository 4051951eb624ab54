mod acpf;
mod bus_types;
mod converter;
mod dcpf;
mod ext_to_int;
mod int_to_ext;
mod math;
mod mpc;
mod mpcdc;
mod newton;
mod opt;
mod order;
mod outages;
mod pu;
mod runacdcpf;
mod sbus;
mod slackdroop;
mod ybus;
mod ybusdc;
mod zones;

pub mod cases;
pub mod debug;

pub use acpf::*;
pub use bus_types::*;
pub use converter::*;
pub use dcpf::*;
pub use ext_to_int::*;
pub use int_to_ext::*;
pub use mpc::*;
pub use mpcdc::*;
pub use opt::*;
pub use order::*;
pub use outages::*;
pub use pu::*;
pub use runacdcpf::*;
pub use sbus::*;
pub use slackdroop::*;
pub use ybus::*;
pub use ybusdc::*;
pub use zones::*;
