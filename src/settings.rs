use crate::error::SettingsError;
use crate::speedtest::request::Endpoint;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const MIB: usize = 1024 * 1024;

pub const DEFAULT_PING_URL: &str = "https://www.google.com/generate_204";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://speed.cloudflare.com/__down?bytes=50000000";
pub const DEFAULT_UPLOAD_URL: &str = "https://speed.cloudflare.com/__up";

/// Endpoints and timing constants for one probe run.
///
/// Every field has a default, so a TOML file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub ping_url: String,
    pub download_url: String,
    pub upload_url: String,

    pub ping_timeout_ms: u64,

    /// Target sampling window; the body is cancelled once it is exceeded.
    pub download_duration_ms: u64,
    /// Absolute cap on the download request, headers included.
    pub download_hard_timeout_ms: u64,

    pub upload_probe_bytes: usize,
    pub upload_probe_timeout_ms: u64,
    /// A probe slower than this is reported as-is instead of scaling up.
    pub upload_slow_threshold_secs: f64,
    /// How long the scaled trial should take at the probe's rate.
    pub upload_target_secs: f64,
    pub upload_max_bytes: usize,
    pub upload_final_timeout_ms: u64,

    pub cache_bust: bool,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ping_url: DEFAULT_PING_URL.to_string(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            ping_timeout_ms: 5_000,
            download_duration_ms: 5_000,
            download_hard_timeout_ms: 7_000,
            upload_probe_bytes: 2 * MIB,
            upload_probe_timeout_ms: 5_000,
            upload_slow_threshold_secs: 2.0,
            upload_target_secs: 4.0,
            upload_max_bytes: 20 * MIB,
            upload_final_timeout_ms: 10_000,
            cache_bust: true,
            user_agent: concat!("netprobe/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file; absent keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        parse_http_url("ping_url", &self.ping_url)?;
        parse_http_url("download_url", &self.download_url)?;
        parse_http_url("upload_url", &self.upload_url)?;

        positive_ms("ping_timeout_ms", self.ping_timeout_ms)?;
        positive_ms("download_duration_ms", self.download_duration_ms)?;
        positive_ms("download_hard_timeout_ms", self.download_hard_timeout_ms)?;
        positive_ms("upload_probe_timeout_ms", self.upload_probe_timeout_ms)?;
        positive_ms("upload_final_timeout_ms", self.upload_final_timeout_ms)?;

        if self.download_hard_timeout_ms <= self.download_duration_ms {
            return Err(invalid(
                "download_hard_timeout_ms",
                format!(
                    "must be greater than download_duration_ms ({} <= {})",
                    self.download_hard_timeout_ms, self.download_duration_ms
                ),
            ));
        }

        if self.upload_probe_bytes == 0 {
            return Err(invalid("upload_probe_bytes", "must be greater than zero".to_string()));
        }
        if self.upload_max_bytes < self.upload_probe_bytes {
            return Err(invalid(
                "upload_max_bytes",
                format!(
                    "must be at least upload_probe_bytes ({} < {})",
                    self.upload_max_bytes, self.upload_probe_bytes
                ),
            ));
        }

        positive_secs("upload_slow_threshold_secs", self.upload_slow_threshold_secs)?;
        positive_secs("upload_target_secs", self.upload_target_secs)?;

        Ok(())
    }

    pub(crate) fn ping_endpoint(&self) -> Result<Endpoint, SettingsError> {
        Ok(Endpoint::new(parse_http_url("ping_url", &self.ping_url)?, self.cache_bust))
    }

    pub(crate) fn download_endpoint(&self) -> Result<Endpoint, SettingsError> {
        Ok(Endpoint::new(
            parse_http_url("download_url", &self.download_url)?,
            self.cache_bust,
        ))
    }

    pub(crate) fn upload_endpoint(&self) -> Result<Endpoint, SettingsError> {
        Ok(Endpoint::new(parse_http_url("upload_url", &self.upload_url)?, self.cache_bust))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn download_duration(&self) -> Duration {
        Duration::from_millis(self.download_duration_ms)
    }

    pub fn download_hard_timeout(&self) -> Duration {
        Duration::from_millis(self.download_hard_timeout_ms)
    }

    pub fn upload_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_probe_timeout_ms)
    }

    pub fn upload_final_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_final_timeout_ms)
    }

    pub fn download_duration_secs(&self) -> u64 {
        self.download_duration_ms / 1_000
    }

    /// The hard timeout is only raised when the new window would reach it.
    pub fn set_download_duration_secs(&mut self, secs: u64) {
        self.download_duration_ms = secs * 1_000;
        if self.download_hard_timeout_ms <= self.download_duration_ms {
            self.download_hard_timeout_ms = self.download_duration_ms + 2_000;
        }
    }

    pub fn upload_max_mib(&self) -> usize {
        self.upload_max_bytes / MIB
    }
}

fn parse_http_url(field: &'static str, raw: &str) -> Result<Url, SettingsError> {
    let url = Url::parse(raw).map_err(|source| SettingsError::InvalidUrl {
        field,
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SettingsError::UnsupportedScheme {
            field,
            scheme: other.to_string(),
        }),
    }
}

fn positive_ms(field: &'static str, value: u64) -> Result<(), SettingsError> {
    if value == 0 {
        return Err(invalid(field, "must be greater than zero".to_string()));
    }
    Ok(())
}

fn positive_secs(field: &'static str, value: f64) -> Result<(), SettingsError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(field, format!("must be a positive number of seconds, got {value}")));
    }
    Ok(())
}

fn invalid(field: &'static str, reason: String) -> SettingsError {
    SettingsError::InvalidValue { field, reason }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    DownloadDuration,
    PingTimeout,
    UploadCeiling,
}

impl SettingsField {
    pub fn next(self) -> Self {
        match self {
            SettingsField::DownloadDuration => SettingsField::PingTimeout,
            SettingsField::PingTimeout => SettingsField::UploadCeiling,
            SettingsField::UploadCeiling => SettingsField::DownloadDuration,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            SettingsField::DownloadDuration => SettingsField::UploadCeiling,
            SettingsField::PingTimeout => SettingsField::DownloadDuration,
            SettingsField::UploadCeiling => SettingsField::PingTimeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.upload_probe_bytes, 2 * 1024 * 1024);
        assert_eq!(settings.upload_max_bytes, 20 * 1024 * 1024);
        assert_eq!(settings.download_hard_timeout(), Duration::from_secs(7));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let settings = Settings {
            upload_url: "ftp://example.com/up".to_string(),
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(
            err,
            SettingsError::UnsupportedScheme { field: "upload_url", .. }
        ));
    }

    #[test]
    fn rejects_unparsable_url() {
        let settings = Settings {
            ping_url: "not a url".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidUrl { field: "ping_url", .. })
        ));
    }

    #[test]
    fn hard_timeout_must_exceed_sample_window() {
        let settings = Settings {
            download_duration_ms: 5_000,
            download_hard_timeout_ms: 5_000,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue { field: "download_hard_timeout_ms", .. })
        ));
    }

    #[test]
    fn upload_ceiling_below_probe_is_rejected() {
        let settings = Settings {
            upload_max_bytes: MIB,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn nan_threshold_is_rejected() {
        let settings = Settings {
            upload_slow_threshold_secs: f64::NAN,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue { field: "upload_slow_threshold_secs", .. })
        ));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let settings = Settings {
            ping_timeout_ms: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "download_duration_ms = 3000").unwrap();
        writeln!(file, "upload_url = \"http://127.0.0.1:9/up\"").unwrap();
        file.flush().unwrap();

        let settings = Settings::from_toml_file(file.path()).unwrap();
        assert_eq!(settings.download_duration_ms, 3_000);
        assert_eq!(settings.upload_url, "http://127.0.0.1:9/up");
        assert_eq!(settings.ping_url, DEFAULT_PING_URL);
        assert!(settings.cache_bust);
    }

    #[test]
    fn unknown_toml_key_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ping_count = 30").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            Settings::from_toml_file(file.path()),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn changing_download_window_keeps_hard_timeout_larger() {
        let mut settings = Settings::default();
        settings.set_download_duration_secs(12);
        assert_eq!(settings.download_duration_ms, 12_000);
        assert!(settings.download_hard_timeout_ms > settings.download_duration_ms);
        settings.validate().unwrap();
    }

    #[test]
    fn changing_download_window_keeps_configured_hard_timeout() {
        let mut settings = Settings {
            download_hard_timeout_ms: 15_000,
            ..Settings::default()
        };

        settings.set_download_duration_secs(6);
        assert_eq!(settings.download_hard_timeout_ms, 15_000);
        settings.set_download_duration_secs(3);
        assert_eq!(settings.download_hard_timeout_ms, 15_000);

        settings.set_download_duration_secs(15);
        assert_eq!(settings.download_hard_timeout_ms, 17_000);
        settings.validate().unwrap();
    }
}
