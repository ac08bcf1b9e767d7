use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    auth::{claims::Role, jwt::JwtKeys, password::hash_password, repo_types::NewUser},
    config::{AdminSeed, AppConfig},
    store::{memory::MemoryStore, postgres::PgStore, Store},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match &config.database_url {
            Some(url) => {
                let pg = PgStore::connect(url).await?;
                pg.migrate().await?;
                Arc::new(pg) as Arc<dyn Store>
            }
            None => {
                warn!("DATABASE_URL not set; data lives in memory and is lost on exit");
                Arc::new(MemoryStore::new()) as Arc<dyn Store>
            }
        };

        let state = Self::from_parts(config, store);
        if let Some(seed) = &state.config.admin {
            state.seed_admin(seed).await?;
        }
        Ok(state)
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn Store>) -> Self {
        Self {
            keys: JwtKeys::new(&config.jwt),
            config,
            store,
        }
    }

    /// Creates the configured administrator unless the email is taken.
    pub async fn seed_admin(&self, seed: &AdminSeed) -> anyhow::Result<()> {
        let email = seed.email.trim().to_lowercase();
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Ok(());
        }
        let created = self
            .store
            .create_user(NewUser {
                name: seed.name.clone(),
                email: email.clone(),
                password_hash: hash_password(&seed.password)?,
                role: Role::Admin,
                image: None,
            })
            .await?;
        if created.is_some() {
            info!(%email, "admin account seeded");
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                ttl_minutes: 5,
            },
            default_rental_days: 1,
            admin: None,
            host: "127.0.0.1".into(),
            port: 0,
        });
        Self::from_parts(config, Arc::new(MemoryStore::new()))
    }
}
