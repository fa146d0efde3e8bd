use serde::{de::DeserializeOwned, Deserialize};

pub struct Config {
    pub(crate) tg: crate::tg::Config,
    pub(crate) db: DbConfig,
}

#[derive(Deserialize)]
pub(crate) struct DbConfig {
    pub(crate) url: url::Url,

    #[serde(default = "default_database_pool_size")]
    pub(crate) pool_size: u32,
}

fn default_database_pool_size() -> u32 {
    // SQLite serializes writers anyway, a handful of connections is enough
    // to keep reads from queueing behind a long write.
    8
}

impl Config {
    pub fn load_or_panic() -> Config {
        Self {
            tg: from_env_or_panic("TG_"),
            db: from_env_or_panic("DATABASE_"),
        }
    }
}

pub(crate) fn from_env_or_panic<T: DeserializeOwned>(prefix: &str) -> T {
    envy::prefixed(prefix).from_env().unwrap_or_else(|err| {
        panic!(
            "BUG: Couldn't load config from environment for {}: {:#?}",
            std::any::type_name::<T>(),
            err
        );
    })
}
