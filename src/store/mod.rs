//! Persistence behind the marketplace.
//!
//! Handlers talk to an `Arc<dyn MarketplaceStore>`. Every mutating call loads
//! the rows it guards, runs the matching rule from
//! [`crate::marketplace::lifecycle`] and writes, all inside one critical
//! section: a database transaction with row locks for [`PgStore`], a single
//! write lock for [`MemoryStore`].

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::marketplace::{
    Account, AccountUpdate, Actor, Demanda, DemandaPatch, DemandaScope, Feedback, LifecycleError,
    NewAccount, NewDemanda, NewFeedback, NewOffer, Offer, OfferScope, ProfessionalStats,
    SearchTerm, Service,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A catalog entry inserted at startup when missing.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSeed {
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

pub const DEFAULT_SERVICES: &[ServiceSeed] = &[
    ServiceSeed {
        name: "Eletricista",
        description: "Instalações, reparos e manutenção elétrica residencial.",
        icon: "⚡",
    },
    ServiceSeed {
        name: "Encanador",
        description: "Vazamentos, desentupimentos e instalações hidráulicas.",
        icon: "🚰",
    },
    ServiceSeed {
        name: "Faxineira",
        description: "Limpeza residencial e pós-obra.",
        icon: "🧹",
    },
    ServiceSeed {
        name: "Pintor",
        description: "Pintura interna e externa, texturas e acabamentos.",
        icon: "🎨",
    },
    ServiceSeed {
        name: "Pedreiro",
        description: "Pequenas obras, reformas e alvenaria.",
        icon: "🧱",
    },
    ServiceSeed {
        name: "Jardineiro",
        description: "Poda, plantio e manutenção de jardins.",
        icon: "🌿",
    },
];

#[async_trait]
pub trait MarketplaceStore: Send + Sync + 'static {
    /// Short name of the backend, reported by the health endpoints.
    fn backend(&self) -> &'static str;

    /// Round-trip to the backing storage.
    async fn ping(&self) -> StoreResult<Duration>;

    // -- accounts --------------------------------------------------------

    async fn create_account(&self, new: NewAccount) -> StoreResult<Account>;
    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>>;
    /// Case-insensitive lookup by login email.
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;
    async fn update_account(&self, id: Uuid, update: AccountUpdate) -> StoreResult<Account>;
    async fn list_professionals(&self, search: &SearchTerm) -> StoreResult<Vec<Account>>;
    async fn professional_stats(&self, id: Uuid) -> StoreResult<ProfessionalStats>;

    // -- service catalog -------------------------------------------------

    async fn list_services(&self) -> StoreResult<Vec<Service>>;
    async fn find_service(&self, id: Uuid) -> StoreResult<Option<Service>>;
    /// Inserts the seeds whose name is not in the catalog yet. Returns how many were added.
    async fn seed_services(&self, seeds: &[ServiceSeed]) -> StoreResult<usize>;

    // -- demandas --------------------------------------------------------

    async fn create_demanda(&self, actor: Actor, new: NewDemanda) -> StoreResult<Demanda>;
    async fn find_demanda(&self, id: Uuid) -> StoreResult<Option<Demanda>>;
    /// Newest first.
    async fn list_demandas(
        &self,
        scope: DemandaScope,
        search: &SearchTerm,
    ) -> StoreResult<Vec<Demanda>>;
    async fn update_demanda(
        &self,
        actor: Actor,
        id: Uuid,
        patch: DemandaPatch,
    ) -> StoreResult<Demanda>;
    /// Removes the demanda together with its offers and feedback.
    async fn delete_demanda(&self, actor: Actor, id: Uuid) -> StoreResult<()>;
    async fn conclude_demanda(&self, actor: Actor, id: Uuid) -> StoreResult<Demanda>;

    // -- offers ----------------------------------------------------------

    async fn create_offer(&self, actor: Actor, new: NewOffer) -> StoreResult<Offer>;
    async fn find_offer(&self, id: Uuid) -> StoreResult<Option<Offer>>;
    /// Newest first.
    async fn list_offers(&self, scope: OfferScope) -> StoreResult<Vec<Offer>>;
    async fn accepted_offer(&self, demanda_id: Uuid) -> StoreResult<Option<Offer>>;
    /// Accepts one offer, moves its demanda to in progress and rejects every
    /// other offer on that demanda, atomically.
    async fn accept_offer(&self, actor: Actor, id: Uuid) -> StoreResult<Offer>;
    async fn withdraw_offer(&self, actor: Actor, id: Uuid) -> StoreResult<()>;

    // -- feedback --------------------------------------------------------

    async fn create_feedback(&self, actor: Actor, new: NewFeedback) -> StoreResult<Feedback>;
    async fn find_feedback(&self, id: Uuid) -> StoreResult<Option<Feedback>>;
    /// Feedback left by one client, newest first.
    async fn list_feedback(&self, client_id: Uuid) -> StoreResult<Vec<Feedback>>;
}

/// Average rating rounded to two decimals, 0 when there is no feedback.
pub(crate) fn average_rating(sum: i64, count: i64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    ((sum as f64 / count as f64) * 100.0).round() / 100.0
}
