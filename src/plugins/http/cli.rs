use crate::plugins::registry::{CliPlugin, DriverContext};
use clap::{Arg, ArgMatches, Command};

pub struct HttpCliPlugin;

impl HttpCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for HttpCliPlugin {
    fn name(&self) -> &'static str {
        "http"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("http_user_agent")
                .long("user-agent")
                .help_heading("HTTP")
                .help("HTTP User-Agent")
                .default_value("framefetch/0.1")
                .num_args(1),
        )
        .arg(
            Arg::new("http_timeout_secs")
                .long("timeout-secs")
                .help_heading("HTTP")
                .help("Connect timeout in seconds (0 disables); responses may take as long as the server likes")
                .default_value("60")
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, ctx: &mut DriverContext) -> anyhow::Result<()> {
        if let Some(ua) = matches.get_one::<String>("http_user_agent") {
            ctx.user_agent = ua.clone();
        }
        if let Some(s) = matches.get_one::<String>("http_timeout_secs") {
            ctx.timeout_secs = s
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid --timeout-secs {:?}: {}", s, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_land_in_driver_context() {
        let plugin = HttpCliPlugin::new();
        let cmd = plugin.augment_command(Command::new("t"));
        let m = cmd
            .try_get_matches_from(["t", "--user-agent", "frame/2", "--timeout-secs", "5"])
            .unwrap();
        let mut ctx = DriverContext::default();
        plugin.apply_matches(&m, &mut ctx).unwrap();
        assert_eq!(ctx.user_agent, "frame/2");
        assert_eq!(ctx.timeout_secs, 5);
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let plugin = HttpCliPlugin::new();
        let m = plugin
            .augment_command(Command::new("t"))
            .try_get_matches_from(["t", "--timeout-secs", "soon"])
            .unwrap();
        assert!(plugin.apply_matches(&m, &mut DriverContext::default()).is_err());
    }
}
