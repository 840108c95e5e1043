use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "hr-convert")]
#[command(about = "Map legacy HR records onto webservice templates and send them")]
pub struct CliArgs {
    /// Path to the TOML job file
    #[arg(short, long, default_value = "job.toml")]
    pub config: String,

    /// Render the first payload and write the mapped table, but send nothing
    #[arg(long)]
    pub dry_run: bool,

    /// List the webservices in the job's catalog and exit
    #[arg(long)]
    pub list_webservices: bool,

    /// Override `dispatch.stop_on_auth_failure` from the job file
    #[arg(long)]
    pub stop_on_auth_failure: Option<bool>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = CliArgs::parse_from([
            "hr-convert",
            "--config",
            "jobs/hire.toml",
            "--dry-run",
            "--stop-on-auth-failure",
            "false",
        ]);
        assert_eq!(args.config, "jobs/hire.toml");
        assert!(args.dry_run);
        assert_eq!(args.stop_on_auth_failure, Some(false));
        assert!(!args.verbose);
    }
}
