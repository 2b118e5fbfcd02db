use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub profile: String,
    /// Load the demo reading room at start-up
    pub seed_demo: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let profile = env::var("PROFILE").unwrap_or_else(|_| "default".to_string());

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            if profile == "default" {
                "sqlite://reading_room.db?mode=rwc".to_string()
            } else {
                format!("sqlite://reading_room_{}.db?mode=rwc", profile)
            }
        });

        Self {
            database_url,
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            profile,
            seed_demo: env::var("SEED_DEMO")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for key in [
            "PROFILE",
            "DATABASE_URL",
            "PORT",
            "CORS_ALLOWED_ORIGINS",
            "SEED_DEMO",
        ] {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn defaults_without_environment() {
        clear();
        let config = Config::from_env();
        assert_eq!(config.profile, "default");
        assert_eq!(config.database_url, "sqlite://reading_room.db?mode=rwc");
        assert_eq!(config.port, 8000);
        assert!(config.cors_allowed_origins.is_empty());
        assert!(!config.seed_demo);
    }

    #[test]
    #[serial]
    fn profile_selects_its_own_database_file() {
        clear();
        unsafe {
            env::set_var("PROFILE", "staging");
            env::set_var("PORT", "not-a-port");
            env::set_var("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,");
            env::set_var("SEED_DEMO", "1");
        }
        let config = Config::from_env();
        assert_eq!(config.database_url, "sqlite://reading_room_staging.db?mode=rwc");
        assert_eq!(config.port, 8000);
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(config.seed_demo);
        clear();
    }
}
