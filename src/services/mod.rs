//! Business logic services

pub mod catalog;
pub mod email;
pub mod ledger;
pub mod media;
pub mod memberships;
pub mod payments;
pub mod redis;
pub mod users;

use crate::{config::AppConfig, error::AppResult, ledger::LedgerPolicy, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub memberships: memberships::MembershipsService,
    pub catalog: catalog::CatalogService,
    pub ledger: ledger::LedgerService,
    pub payments: payments::PaymentsService,
    pub email: email::EmailService,
    pub redis: redis::RedisService,
    pub media: media::MediaService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub async fn new(
        repository: Repository,
        config: &AppConfig,
        redis_service: redis::RedisService,
    ) -> AppResult<Self> {
        let policy = LedgerPolicy::from(&config.ledger);
        let email = email::EmailService::new(config.email.clone());
        let media = media::MediaService::local(&config.media);
        let ledger = ledger::LedgerService::new(repository.clone(), policy);

        Ok(Self {
            users: users::UsersService::new(
                repository.clone(),
                config.auth.clone(),
                redis_service.clone(),
                email.clone(),
                media.clone(),
            ),
            memberships: memberships::MembershipsService::new(repository.clone(), policy),
            catalog: catalog::CatalogService::new(repository.clone(), media.clone()),
            payments: payments::PaymentsService::new(
                repository.clone(),
                ledger.clone(),
                config.payments.clone(),
            ),
            ledger,
            email,
            redis: redis_service,
            media,
            repository,
        })
    }

    /// Database round trip used by the readiness probe
    pub async fn ping_database(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
