use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_store_backend, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamSettings, RuntimeSettings,
    SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings, StoreBackend,
    StoreSettings, TelemetrySettings,
};

const SUPPORTED_ALGORITHMS: &[&str] = &["HS256", "HS384", "HS512"];

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("ACADEMIA_HOST", "0.0.0.0");
        let port = env_or_default("ACADEMIA_PORT", "8000");

        let environment = parse_environment(
            env_optional("ACADEMIA_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config =
            env_optional("ACADEMIA_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Academia CBT");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = env_optional("SECRET_KEY").ok_or(ConfigError::MissingSecret("SECRET_KEY"))?;
        let algorithm = env_or_default("ALGORITHM", "HS256");
        let audience = env_optional("JWT_AUDIENCE");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let store_backend = parse_store_backend(env_optional("STORE_BACKEND"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "academia");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "academia_cbt");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DB_MAX_CONNECTIONS", env_or_default("DB_MAX_CONNECTIONS", "20"))?;
        let acquire_timeout_seconds = parse_u64(
            "DB_ACQUIRE_TIMEOUT_SECONDS",
            env_or_default("DB_ACQUIRE_TIMEOUT_SECONDS", "5"),
        )?;

        let submit_grace_seconds =
            parse_u64("SUBMIT_GRACE_SECONDS", env_or_default("SUBMIT_GRACE_SECONDS", "30"))?;

        let log_level = env_or_default("ACADEMIA_LOG_LEVEL", "info");
        let json = env_optional("ACADEMIA_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm, audience },
            cors: CorsSettings { origins: cors_origins },
            store: StoreSettings { backend: store_backend },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
                acquire_timeout_seconds,
            },
            exam: ExamSettings {
                submit_grace_seconds: i64::try_from(submit_grace_seconds).map_err(|_| {
                    ConfigError::InvalidValue {
                        field: "SUBMIT_GRACE_SECONDS",
                        value: submit_grace_seconds.to_string(),
                    }
                })?,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn store(&self) -> &StoreSettings {
        &self.store
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_ALGORITHMS.contains(&self.security.algorithm.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "ALGORITHM",
                value: self.security.algorithm.clone(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DB_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        if !self.api.api_v1_str.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "API_V1_STR",
                value: self.api.api_v1_str.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.store.backend == StoreBackend::Memory {
            return Err(ConfigError::InvalidValue {
                field: "STORE_BACKEND",
                value: self.store.backend.as_str().to_string(),
            });
        }
        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
