//! Process arguments exposed to the container. The raw list is available as the [Args] bean, while
//! [ArgsConfigurationSource] turns it into configuration entries, taking precedence over other
//! sources.
//!
//! Supported forms are `--key value`, `key value` and `--key=value`. A key which is last, or is
//! directly followed by another `--` argument, is a flag set to `true`. Later occurrences of a key
//! replace earlier ones.
//!
//! Additionally, `--fusion-properties-<anything>=<path-or-inline>` merges all entries of a
//! properties file. When no file exists under the given path, the value itself is parsed as
//! properties content:
//!
//! ```
//! use fusion::args::ArgsConfigurationSource;
//! use fusion_di::configuration::ConfigurationSource;
//!
//! let args = vec![
//!     "--fusion-properties-inline=server.port=8080".to_string(),
//!     "--mode".to_string(),
//!     "dev".to_string(),
//! ];
//!
//! let source = ArgsConfigurationSource::new(&args).unwrap();
//! assert_eq!(source.get("server.port").as_deref(), Some("8080"));
//! assert_eq!(source.get("mode").as_deref(), Some("dev"));
//! ```

use derive_more::{Constructor, Deref};
use fusion_di::configuration::ConfigurationSource;
use std::collections::BTreeMap;
use std::path::Path;
use std::{fs, io};
use thiserror::Error;
use tracing::debug;

const KEY_PREFIX: &str = "--";

/// Prefix of arguments pointing to properties files.
pub const PROPERTIES_PREFIX: &str = "--fusion-properties-";

/// Value of keys given without one.
pub const FLAG_VALUE: &str = "true";

#[derive(Error, Debug)]
pub enum ArgsError {
    #[error("Cannot read properties file '{path}': {source}")]
    PropertiesFile {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Arguments the application was started with, without the program name.
#[derive(Clone, Debug, Default, Eq, PartialEq, Constructor, Deref)]
pub struct Args(Vec<String>);

impl Args {
    /// Reads arguments of the current process.
    pub fn from_env() -> Self {
        Self(std::env::args().skip(1).collect())
    }
}

/// Configuration entries parsed from process arguments.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ArgsConfigurationSource {
    values: BTreeMap<String, String>,
}

impl ArgsConfigurationSource {
    pub fn new(args: &[String]) -> Result<Self, ArgsError> {
        let mut values = BTreeMap::new();
        let mut args = args.iter().peekable();

        while let Some(arg) = args.next() {
            if let Some(properties) = arg.strip_prefix(PROPERTIES_PREFIX) {
                let Some((_, location)) = properties.split_once('=') else {
                    debug!(arg, "Ignoring properties argument without a location.");
                    continue;
                };

                values.extend(load_properties(location)?);
                continue;
            }

            let key = arg.strip_prefix(KEY_PREFIX).unwrap_or(arg);
            if let Some((key, value)) = key.split_once('=') {
                values.insert(key.to_string(), value.to_string());
                continue;
            }

            let value = match args.peek() {
                Some(next) if !next.starts_with(KEY_PREFIX) => {
                    args.next().cloned().unwrap_or_default()
                }
                _ => FLAG_VALUE.to_string(),
            };

            values.insert(key.to_string(), value);
        }

        Ok(Self { values })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigurationSource for ArgsConfigurationSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

fn load_properties(location: &str) -> Result<Vec<(String, String)>, ArgsError> {
    let path = Path::new(location);
    if !path.is_file() {
        return Ok(parse_properties(location));
    }

    debug!(path = location, "Loading properties file.");

    fs::read_to_string(path)
        .map(|content| parse_properties(&content))
        .map_err(|source| ArgsError::PropertiesFile {
            path: location.to_string(),
            source,
        })
}

/// Parses `key=value`, `key: value` and `key value` lines. Lines starting with `#` or `!` are
/// comments, and a trailing backslash continues the value on the next line.
pub fn parse_properties(content: &str) -> Vec<(String, String)> {
    let mut properties = vec![];
    let mut logical_line = String::new();

    for line in content.lines() {
        let line = line.trim_start();
        if logical_line.is_empty() && (line.is_empty() || line.starts_with(['#', '!'])) {
            continue;
        }

        match line.strip_suffix('\\') {
            Some(continued) => logical_line.push_str(continued),
            None => {
                logical_line.push_str(line);
                properties.push(split_property(&logical_line));
                logical_line.clear();
            }
        }
    }

    if !logical_line.is_empty() {
        properties.push(split_property(&logical_line));
    }

    properties
}

fn split_property(line: &str) -> (String, String) {
    let line = line.trim();
    match line.find(|c: char| c == '=' || c == ':' || c.is_whitespace()) {
        Some(separator) => {
            let key = &line[..separator];
            let value = line[separator..]
                .trim_start()
                .strip_prefix(['=', ':'])
                .unwrap_or(&line[separator..])
                .trim();

            (key.to_string(), value.to_string())
        }
        None => (line.to_string(), String::new()),
    }
}
