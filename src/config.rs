use std::env;

#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub sqlite_path: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_header: String,
    pub upload_storage_path: String,
    pub reset_token_ttl_minutes: i64,
    pub max_upload_bytes: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(38321);

        let sqlite_path = env::var("SQLITE_PATH").unwrap_or_else(|_| "/opt/fitdiary/data.sqlite".to_string());
        let database_url = env::var("DATABASE_URL").ok();

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| "fitdiary-dev-secret".to_string());
        let token_header = env::var("TOKEN_HEADER").unwrap_or_else(|_| "token".to_string());

        let upload_storage_path = env::var("UPLOAD_STORAGE_PATH")
            .unwrap_or_else(|_| "/opt/fitdiary/upload".to_string());

        let reset_token_ttl_minutes = env::var("RESET_TOKEN_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(30);

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10 * 1024 * 1024);

        Self {
            server_port,
            sqlite_path,
            database_url,
            jwt_secret,
            token_header,
            upload_storage_path,
            reset_token_ttl_minutes,
            max_upload_bytes,
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        let path = self.sqlite_path.trim();
        if path.starts_with("sqlite:") || path.starts_with("file:") {
            return path.to_string();
        }
        format!("sqlite://{}", path)
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_test() -> Self {
        Self {
            server_port: 0,
            sqlite_path: String::new(),
            database_url: Some("sqlite::memory:".to_string()),
            jwt_secret: "test-secret".to_string(),
            token_header: "token".to_string(),
            upload_storage_path: env::temp_dir()
                .join("fitdiary-test-upload")
                .to_string_lossy()
                .to_string(),
            reset_token_ttl_minutes: 30,
            max_upload_bytes: 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_path_becomes_url() {
        let mut config = AppConfig::for_test();
        config.database_url = None;
        config.sqlite_path = "/tmp/fit.sqlite".to_string();
        assert_eq!(config.database_url(), "sqlite:///tmp/fit.sqlite");

        config.sqlite_path = "sqlite::memory:".to_string();
        assert_eq!(config.database_url(), "sqlite::memory:");
    }

    #[test]
    fn explicit_database_url_wins() {
        let mut config = AppConfig::for_test();
        config.database_url = Some("mysql://root@localhost/fit".to_string());
        assert_eq!(config.database_url(), "mysql://root@localhost/fit");
    }
}
