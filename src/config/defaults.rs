use super::*;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-bff.amberelectric.com.au/api/v1.0".to_string(),
            market_url: "https://api.amberelectric.com.au/prices/listprices".to_string(),
            geocode_url: "https://nominatim.openstreetmap.org/reverse".to_string(),
            request_timeout_ms: 10_000,
            user_agent: format!(
                "Mozilla/5.0 (compatible; amber-electric-rs/{}; +https://github.com/troykelly/amber-electric-rs)",
                env!("CARGO_PKG_VERSION")
            ),
            referer: "https://github.com/troykelly/amber-electric-rs".to_string(),
            origin: "https://app.amberelectric.com.au".to_string(),
            contact_email: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: None,
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}
