use derive_builder::Builder;

/// Options for the sequential AC/DC power flow.
///
/// The defaults match the tolerances and iteration caps that have become
/// customary for sequential VSC MTDC power flow studies.
#[derive(Debug, Clone, Builder)]
pub struct AcDcOpt {
    /// Outer AC/DC iteration tolerance on the slack/droop grid injections.
    #[builder(default = "1e-8")]
    pub tol_acdc: f64,

    /// Maximum number of outer AC/DC iterations.
    #[builder(default = "10")]
    pub max_it_acdc: usize,

    /// DC network Newton tolerance.
    #[builder(default = "1e-8")]
    pub tol_dc: f64,

    /// Maximum number of DC network Newton iterations.
    #[builder(default = "10")]
    pub max_it_dc: usize,

    /// Slack/droop converter loss iteration tolerance.
    #[builder(default = "1e-8")]
    pub tol_slack_droop: f64,

    /// Maximum number of slack/droop converter loss iterations.
    #[builder(default = "10")]
    pub max_it_slack_droop: usize,

    /// Inner slack/droop converter Newton tolerance.
    #[builder(default = "1e-8")]
    pub tol_slack_droop_int: f64,

    /// Maximum number of inner slack/droop converter Newton iterations.
    #[builder(default = "10")]
    pub max_it_slack_droop_int: usize,

    /// Allow more than one DC slack converter per DC grid. When false,
    /// surplus slack converters are demoted to constant power control.
    #[builder(default = "false")]
    pub mult_slack: bool,

    /// Enforce converter AC voltage and current limits.
    #[builder(default = "false")]
    pub enforce_ac_limits: bool,

    /// Enforce DC voltage limits. Reserved; enabling it is rejected.
    #[builder(default = "false")]
    pub enforce_dc_limits: bool,

    /// Setpoint corrections smaller than this are not treated as limit
    /// violations.
    #[builder(default = "1e-2")]
    pub tol_lim: f64,

    /// AC Newton power flow tolerance.
    #[builder(default = "1e-8")]
    pub tol_ac: f64,

    /// Maximum number of AC Newton iterations.
    #[builder(default = "10")]
    pub max_it_ac: usize,
}

impl Default for AcDcOpt {
    fn default() -> Self {
        Self {
            tol_acdc: 1e-8,
            max_it_acdc: 10,
            tol_dc: 1e-8,
            max_it_dc: 10,
            tol_slack_droop: 1e-8,
            max_it_slack_droop: 10,
            tol_slack_droop_int: 1e-8,
            max_it_slack_droop_int: 10,
            mult_slack: false,
            enforce_ac_limits: false,
            enforce_dc_limits: false,
            tol_lim: 1e-2,
            tol_ac: 1e-8,
            max_it_ac: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_builder_defaults() -> Result<()> {
        let opt = AcDcOptBuilder::default()
            .enforce_ac_limits(true)
            .build()
            .map_err(anyhow::Error::msg)?;
        assert!(opt.enforce_ac_limits);
        assert_eq!(opt.tol_acdc, 1e-8);
        assert_eq!(opt.max_it_acdc, 10);
        assert_eq!(opt.tol_lim, 1e-2);
        Ok(())
    }
}
