use std::{fmt, fs::File, io::Read, path::Path, str::FromStr};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't open config file")]
    Io(#[from] std::io::Error),
    #[error("couldn't decode config file: {0}")]
    Decode(String),
    #[error("couldn't encode config: {0}")]
    Encode(String),
    #[error("the provided service type {0:?} is not recognized")]
    UnknownServiceType(String),
    #[error("the provided start type {0:?} is not recognized")]
    UnknownStartType(String),
}

/// How the service manager hosts the service process.
/// Accepted spellings: own | share | userown | usershare | driver | filesys | interact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    OwnProcess,
    ShareProcess,
    UserOwnProcess,
    UserShareProcess,
    KernelDriver,
    FileSystemDriver,
    Interactive,
}

impl ServiceKind {
    pub fn value(self) -> u32 {
        match self {
            ServiceKind::OwnProcess => 0x10,
            ServiceKind::ShareProcess => 0x20,
            ServiceKind::UserOwnProcess => 0x50,
            ServiceKind::UserShareProcess => 0x60,
            ServiceKind::KernelDriver => 0x01,
            ServiceKind::FileSystemDriver => 0x02,
            ServiceKind::Interactive => 0x100,
        }
    }
}

impl FromStr for ServiceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "own" => Ok(ServiceKind::OwnProcess),
            "share" => Ok(ServiceKind::ShareProcess),
            "userown" => Ok(ServiceKind::UserOwnProcess),
            "usershare" => Ok(ServiceKind::UserShareProcess),
            "driver" => Ok(ServiceKind::KernelDriver),
            "filesys" => Ok(ServiceKind::FileSystemDriver),
            "interact" => Ok(ServiceKind::Interactive),
            _ => Err(ConfigError::UnknownServiceType(s.to_string())),
        }
    }
}

/// When the service manager starts the service.
/// Accepted spellings: boot | system | auto | delayed-auto | manual | disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    Boot,
    System,
    Auto,
    DelayedAuto,
    Manual,
    Disabled,
}

impl StartKind {
    /// Delayed start shares the automatic value; the delay travels as a separate flag.
    pub fn value(self) -> u32 {
        match self {
            StartKind::Boot => 0x00,
            StartKind::System => 0x01,
            StartKind::Auto | StartKind::DelayedAuto => 0x02,
            StartKind::Manual => 0x03,
            StartKind::Disabled => 0x04,
        }
    }

    pub fn is_delayed(self) -> bool {
        self == StartKind::DelayedAuto
    }
}

impl FromStr for StartKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "boot" => Ok(StartKind::Boot),
            "system" => Ok(StartKind::System),
            "auto" => Ok(StartKind::Auto),
            "delayed-auto" => Ok(StartKind::DelayedAuto),
            "manual" => Ok(StartKind::Manual),
            "disabled" => Ok(StartKind::Disabled),
            _ => Err(ConfigError::UnknownStartType(s.to_string())),
        }
    }
}

/// Document format of a config file, picked from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                ConfigFormat::Yaml
            }
            _ => ConfigFormat::Json,
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFormat::Json => write!(f, "json"),
            ConfigFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// One service definition as written by the operator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Key in the service database, not to be confused with `display_name`.
    pub name: String,
    /// Binary run inside the service, relative paths resolve against the config file's directory.
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub account_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Passed to the image verbatim, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub start_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_level: String,
}

/// A config in the shape the service manager registration call accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub service_kind: ServiceKind,
    pub start_kind: StartKind,
    pub delayed_auto_start: bool,
    pub display_name: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub account_name: Option<String>,
    pub password: Option<String>,
}

impl ServiceSettings {
    pub fn service_type(&self) -> u32 {
        self.service_kind.value()
    }

    pub fn start_type(&self) -> u32 {
        self.start_kind.value()
    }
}

impl Config {
    pub fn parse(raw: &[u8], format: ConfigFormat) -> Result<Config, ConfigError> {
        match format {
            ConfigFormat::Json => {
                serde_json::from_slice(raw).map_err(|e| ConfigError::Decode(e.to_string()))
            }
            ConfigFormat::Yaml => {
                serde_yaml::from_slice(raw).map_err(|e| ConfigError::Decode(e.to_string()))
            }
        }
    }

    pub fn encode(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        match format {
            ConfigFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| ConfigError::Encode(e.to_string()))
            }
            ConfigFormat::Yaml => {
                serde_yaml::to_string(self).map_err(|e| ConfigError::Encode(e.to_string()))
            }
        }
    }

    /// Converts the operator's config into registration settings.
    /// A missing service or start type is as unknown as a misspelled one.
    pub fn mold(&self) -> Result<ServiceSettings, ConfigError> {
        let service_kind: ServiceKind = self.service_type.parse()?;
        let start_kind: StartKind = self.start_type.parse()?;
        Ok(ServiceSettings {
            service_kind,
            start_kind,
            delayed_auto_start: start_kind.is_delayed(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            dependencies: self.depends_on.clone(),
            account_name: non_empty(&self.account_name),
            password: non_empty(&self.password),
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let format = ConfigFormat::from_path(path);
    debug!("loading {} config {}", format, path.display());
    let mut file = File::open(path)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Config::parse(&contents, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_config() -> Config {
        Config {
            name: "demo".to_string(),
            image: "app.exe".to_string(),
            options: vec!["--flag".to_string()],
            service_type: "own".to_string(),
            start_type: "auto".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_mold_demo_config() {
        let settings = demo_config().mold().unwrap();
        assert_eq!(settings.service_type(), 0x10);
        assert_eq!(settings.start_type(), 0x02);
        assert!(!settings.delayed_auto_start);
        assert_eq!(settings.account_name, None);
        assert_eq!(settings.password, None);
    }

    #[test]
    fn test_service_kinds_case_insensitive() {
        let cases = [
            ("own", 0x10),
            ("SHARE", 0x20),
            ("UserOwn", 0x50),
            ("usershare", 0x60),
            ("Driver", 0x01),
            ("filesys", 0x02),
            ("INTERACT", 0x100),
        ];
        for (name, value) in cases {
            let mut config = demo_config();
            config.service_type = name.to_string();
            assert_eq!(config.mold().unwrap().service_type(), value, "{}", name);
        }
    }

    #[test]
    fn test_unknown_service_type() {
        let mut config = demo_config();
        config.service_type = "owned".to_string();
        assert!(matches!(
            config.mold(),
            Err(ConfigError::UnknownServiceType(s)) if s == "owned"
        ));
        config.service_type = String::new();
        assert!(matches!(config.mold(), Err(ConfigError::UnknownServiceType(_))));
    }

    #[test]
    fn test_start_kinds_and_delay() {
        let cases = [
            ("boot", 0x00, false),
            ("System", 0x01, false),
            ("auto", 0x02, false),
            ("Delayed-Auto", 0x02, true),
            ("MANUAL", 0x03, false),
            ("disabled", 0x04, false),
        ];
        for (name, value, delayed) in cases {
            let mut config = demo_config();
            config.start_type = name.to_string();
            let settings = config.mold().unwrap();
            assert_eq!(settings.start_type(), value, "{}", name);
            assert_eq!(settings.delayed_auto_start, delayed, "{}", name);
        }
    }

    #[test]
    fn test_unknown_start_type() {
        let mut config = demo_config();
        config.start_type = "delayed".to_string();
        assert!(matches!(config.mold(), Err(ConfigError::UnknownStartType(_))));
        config.start_type = String::new();
        assert!(matches!(config.mold(), Err(ConfigError::UnknownStartType(_))));
    }

    #[test]
    fn test_service_type_checked_before_start_type() {
        let config = Config {
            name: "demo".to_string(),
            image: "app.exe".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.mold(), Err(ConfigError::UnknownServiceType(_))));
    }

    #[test]
    fn test_parse_json_ignores_unknown_fields() {
        let raw = br#"{
            "Name": "demo",
            "Image": "app.exe",
            "Options": ["--flag", "value"],
            "DependsOn": ["Tcpip"],
            "ServiceType": "own",
            "StartType": "auto",
            "Restart": "always"
        }"#;
        let config = Config::parse(raw, ConfigFormat::Json).unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.options, vec!["--flag", "value"]);
        assert_eq!(config.depends_on, vec!["Tcpip"]);
        assert!(config.description.is_empty());
        assert!(config.password.is_empty());
    }

    #[test]
    fn test_parse_log_level() {
        let raw = br#"{"Name": "demo", "Image": "app.exe", "LogLevel": "debug"}"#;
        let config = Config::parse(raw, ConfigFormat::Json).unwrap();
        assert_eq!(config.log_level, "debug");

        let raw = b"Name: demo\nImage: app.exe\n";
        let config = Config::parse(raw, ConfigFormat::Yaml).unwrap();
        assert!(config.log_level.is_empty());
        assert!(!config.encode(ConfigFormat::Json).unwrap().contains("LogLevel"));
    }

    #[test]
    fn test_parse_yaml() {
        let raw = b"Name: demo\nImage: bin/app\nStartType: manual\nServiceType: share\n";
        let config = Config::parse(raw, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.image, "bin/app");
        assert_eq!(config.mold().unwrap().start_type(), 0x03);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Config::parse(b"{ not json", ConfigFormat::Json),
            Err(ConfigError::Decode(_))
        ));
    }

    #[test]
    fn test_encode_then_decode_keeps_fields() {
        let config = Config {
            depends_on: vec!["Tcpip".to_string(), "Dnscache".to_string()],
            description: "demo service".to_string(),
            account_name: ".\\svc".to_string(),
            password: "secret".to_string(),
            display_name: "Demo".to_string(),
            ..demo_config()
        };
        for format in [ConfigFormat::Json, ConfigFormat::Yaml] {
            let encoded = config.encode(format).unwrap();
            let decoded = Config::parse(encoded.as_bytes(), format).unwrap();
            assert_eq!(decoded, config, "{}", format);
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("svc.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("svc.YML")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("svc.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("svc")), ConfigFormat::Json);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Path::new("/definitely/not/here/svc.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_io_error_message_leaves_cause_to_source() {
        use std::error::Error as _;
        let err = load_config(Path::new("/definitely/not/here/svc.json")).unwrap_err();
        assert_eq!(err.to_string(), "couldn't open config file");
        assert!(err.source().is_some());
    }
}
