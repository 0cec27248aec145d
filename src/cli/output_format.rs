use serde::Serialize;
use std::str::FromStr;
use structopt::StructOpt;
use thiserror::Error;

#[derive(StructOpt, Debug)]
pub struct OutputFormat {
    /// Format of the output. Can be "yaml" or "json"
    #[structopt(long = "output-format", default_value = "yaml", parse(try_from_str))]
    format: FormatVariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatVariant {
    Yaml,
    Json,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to format output as YAML")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to format output as JSON")]
    Json(#[from] serde_json::Error),
}

impl FromStr for FormatVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &*s.trim().to_lowercase() {
            "yaml" => Ok(FormatVariant::Yaml),
            "json" => Ok(FormatVariant::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

impl OutputFormat {
    pub fn format<T: Serialize + ?Sized>(&self, data: &T) -> Result<String, Error> {
        let formatted = match self.format {
            FormatVariant::Yaml => serde_yaml::to_string(data)?,
            FormatVariant::Json => serde_json::to_string_pretty(data)?,
        };
        Ok(formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output_format(args: &[&str]) -> OutputFormat {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        OutputFormat::from_iter(argv)
    }

    #[test]
    fn yaml_by_default() {
        let formatted = output_format(&[])
            .format(&json!({ "last-round": 12 }))
            .unwrap();
        assert!(formatted.contains("last-round: 12"));
    }

    #[test]
    fn json_on_request() {
        let formatted = output_format(&["--output-format", "json"])
            .format(&json!({ "last-round": 12 }))
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&formatted).unwrap();
        assert_eq!(parsed["last-round"], 12);
    }
}
