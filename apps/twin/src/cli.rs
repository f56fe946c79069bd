use clap::{CommandFactory, Parser};

#[derive(Debug, Parser)]
#[command(
    name = "rockfall-twin",
    version,
    about = "Headless client for the rockfall digital-twin telemetry API"
)]
pub struct CliArgs {
    /// Fetch everything once for the configured view, print stats and exit
    #[arg(long)]
    pub headless: bool,

    /// Print stats as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Override the API base URL
    #[arg(long = "api-url", value_name = "URL")]
    pub api_url: Option<String>,

    /// Override the initial view (minLon,minLat,maxLon,maxLat)
    #[arg(long, value_name = "BBOX", allow_hyphen_values = true)]
    pub view: Option<String>,

    /// Query scenario risk for sustained rainfall and exit
    #[arg(long = "what-if", value_name = "RAIN_MMHR")]
    pub what_if: Option<f64>,

    /// Scenario duration for --what-if
    #[arg(long, value_name = "HOURS", default_value_t = 2, requires = "what_if")]
    pub hours: u32,
}

impl CliArgs {
    pub fn apply_env_overrides(&self) {
        if let Some(url) = &self.api_url {
            std::env::set_var("TWIN_API_URL", url);
        }
        if let Some(view) = &self.view {
            std::env::set_var("TWIN_VIEW", view);
        }
        if self.debug {
            std::env::set_var("DEBUG", "1");
        }
    }

    pub fn help_text() -> String {
        let mut command = Self::command();
        let mut buffer = Vec::new();
        command.write_help(&mut buffer).ok();
        String::from_utf8_lossy(&buffer).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_what_if_with_hours() {
        let args = CliArgs::parse_from(["rockfall-twin", "--what-if", "12.5", "--hours", "6"]);
        assert_eq!(args.what_if, Some(12.5));
        assert_eq!(args.hours, 6);
        assert!(!args.headless);
    }

    #[test]
    fn view_accepts_negative_coordinates() {
        let args = CliArgs::parse_from(["rockfall-twin", "--headless", "--view", "-10,-5,10,5"]);
        assert_eq!(args.view.as_deref(), Some("-10,-5,10,5"));
        assert!(args.headless);
    }

    #[test]
    fn hours_requires_what_if() {
        assert!(CliArgs::try_parse_from(["rockfall-twin", "--hours", "3"]).is_err());
    }

    #[test]
    fn help_mentions_flags() {
        let help = CliArgs::help_text();
        assert!(help.contains("--what-if"));
        assert!(help.contains("--api-url"));
    }
}
