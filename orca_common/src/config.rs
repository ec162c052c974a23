//! Configuration helpers for the Orca head node and workers.

use ::std::{fs::File, io::BufReader, path::Path};

use ::clap::Parser;
use ::serde::de::DeserializeOwned;
use ::serde_json::from_reader;

use crate::error::{OrcaError, Result};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
/// Command line arguments for the head node and workers.
pub struct Args {
    /// path to the config file
    #[arg(long)]
    pub config_path: String,
}

impl Args {
    /// helper function for exporting the `clap::Parser::parse` function
    pub fn parse_args() -> Self {
        Args::parse()
    }
}

/// Load a json config file into `T`.
pub fn load_config<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref()).map_err(OrcaError::fail_to_load_config)?;
    let reader = BufReader::new(file);
    let config = from_reader(reader).map_err(OrcaError::fail_to_load_config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrcaErrorType;
    use ::serde::Deserialize;
    use ::std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        name: String,
    }

    fn write_temp_config(file_name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), file_name));
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_config_from_file() -> Result<()> {
        let path = write_temp_config("sample.json", r#"{"name": "orca"}"#);
        let config: Sample = load_config(&path)?;
        assert_eq!(
            config,
            Sample {
                name: "orca".to_owned()
            }
        );
        Ok(())
    }

    #[test]
    fn config_file_not_exist() {
        let result = load_config::<Sample, _>("/not/exist/config.json");
        assert!(result.is_err_and(|e| e.get_error_type() == OrcaErrorType::FailToLoadConfig));
    }

    #[test]
    fn invalid_config_file() {
        let path = write_temp_config("invalid.json", r#"{"name": "orca", "port": 1}"#);
        let result = load_config::<Sample, _>(&path);
        assert!(result.is_err_and(|e| e
            .to_string()
            .starts_with("Fail to load config: unknown field `port`")));
    }
}
