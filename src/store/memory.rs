use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{average_rating, MarketplaceStore, ServiceSeed, StoreError, StoreResult};
use crate::marketplace::lifecycle::{self, LifecycleError};
use crate::marketplace::{
    Account, AccountUpdate, Actor, Demanda, DemandaPatch, DemandaScope, DemandaStatus, Feedback,
    NewAccount, NewDemanda, NewFeedback, NewOffer, Offer, OfferScope, OfferStatus,
    ProfessionalStats, SearchTerm, Service, User,
};

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    services: HashMap<Uuid, Service>,
    demandas: HashMap<Uuid, Demanda>,
    offers: HashMap<Uuid, Offer>,
    feedback: HashMap<Uuid, Feedback>,
}

/// Process-local store used when no database is configured, and by tests.
///
/// All writes take the single state lock, which serializes them the same way
/// row locks serialize the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> chrono::DateTime<Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<Duration> {
        let start = Instant::now();
        let _guard = self.state.read().await;
        Ok(start.elapsed())
    }

    async fn create_account(&self, new: NewAccount) -> StoreResult<Account> {
        let mut state = self.state.write().await;
        let taken = state
            .accounts
            .values()
            .any(|a| a.user.email.eq_ignore_ascii_case(&new.email));
        if taken {
            return Err(StoreError::Conflict("Email already registered".to_string()));
        }

        let account = Account {
            user: User {
                id: Uuid::new_v4(),
                email: new.email,
                password_hash: new.password_hash,
                is_professional: new.is_professional,
                date_joined: Utc::now(),
            },
            profile: new.profile,
        };
        state.accounts.insert(account.user.id, account.clone());
        Ok(account)
    }

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_account(&self, id: Uuid, update: AccountUpdate) -> StoreResult<Account> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::NotFound("account"))?;
        update.apply_to(account);
        Ok(account.clone())
    }

    async fn list_professionals(&self, search: &SearchTerm) -> StoreResult<Vec<Account>> {
        let state = self.state.read().await;
        let mut found: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.user.is_professional)
            .filter(|a| match search.as_str() {
                None => true,
                Some(term) => {
                    a.user.email.eq_ignore_ascii_case(term)
                        || search.matches_any([
                            a.profile.full_name.as_str(),
                            a.profile.palavras_chave.as_str(),
                            a.profile.cidade.as_str(),
                        ])
                }
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.user.email.cmp(&b.user.email));
        Ok(found)
    }

    async fn professional_stats(&self, id: Uuid) -> StoreResult<ProfessionalStats> {
        let state = self.state.read().await;
        let (sum, count) = state
            .feedback
            .values()
            .filter(|f| f.professional_id == id)
            .fold((0i64, 0i64), |(sum, count), f| (sum + f.rating as i64, count + 1));
        let demands_completed = state
            .demandas
            .values()
            .filter(|d| d.professional_id == Some(id) && d.status == DemandaStatus::Completed)
            .count() as i64;
        Ok(ProfessionalStats {
            rating: average_rating(sum, count),
            feedback_count: count,
            demands_completed,
        })
    }

    async fn list_services(&self) -> StoreResult<Vec<Service>> {
        let state = self.state.read().await;
        let mut services: Vec<Service> = state.services.values().cloned().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn find_service(&self, id: Uuid) -> StoreResult<Option<Service>> {
        Ok(self.state.read().await.services.get(&id).cloned())
    }

    async fn seed_services(&self, seeds: &[ServiceSeed]) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let mut added = 0;
        for seed in seeds {
            if state.services.values().any(|s| s.name == seed.name) {
                continue;
            }
            let service = Service {
                id: Uuid::new_v4(),
                name: seed.name.to_string(),
                description: seed.description.to_string(),
                icon: seed.icon.to_string(),
            };
            state.services.insert(service.id, service);
            added += 1;
        }
        Ok(added)
    }

    async fn create_demanda(&self, actor: Actor, new: NewDemanda) -> StoreResult<Demanda> {
        lifecycle::ensure_can_create_demanda(&actor)?;
        let mut state = self.state.write().await;
        if !state.services.contains_key(&new.service_id) {
            return Err(StoreError::NotFound("service"));
        }
        let demanda = Demanda {
            id: Uuid::new_v4(),
            client_id: actor.id,
            professional_id: None,
            service_id: new.service_id,
            title: new.title,
            description: new.description,
            cep: new.cep,
            status: DemandaStatus::Pending,
            created_at: Utc::now(),
        };
        state.demandas.insert(demanda.id, demanda.clone());
        Ok(demanda)
    }

    async fn find_demanda(&self, id: Uuid) -> StoreResult<Option<Demanda>> {
        Ok(self.state.read().await.demandas.get(&id).cloned())
    }

    async fn list_demandas(
        &self,
        scope: DemandaScope,
        search: &SearchTerm,
    ) -> StoreResult<Vec<Demanda>> {
        let state = self.state.read().await;
        let mut found: Vec<Demanda> = state
            .demandas
            .values()
            .filter(|d| scope.includes(d))
            .filter(|d| {
                let service_name = state
                    .services
                    .get(&d.service_id)
                    .map(|s| s.name.as_str())
                    .unwrap_or_default();
                search.matches_any([
                    d.title.as_str(),
                    d.description.as_str(),
                    d.cep.as_str(),
                    service_name,
                ])
            })
            .cloned()
            .collect();
        newest_first(&mut found, |d| d.created_at);
        Ok(found)
    }

    async fn update_demanda(
        &self,
        actor: Actor,
        id: Uuid,
        patch: DemandaPatch,
    ) -> StoreResult<Demanda> {
        let mut state = self.state.write().await;
        if let Some(service_id) = patch.service_id {
            if !state.services.contains_key(&service_id) {
                return Err(StoreError::NotFound("service"));
            }
        }
        let demanda = state
            .demandas
            .get_mut(&id)
            .ok_or(StoreError::NotFound("demanda"))?;
        lifecycle::ensure_can_edit_demanda(&actor, demanda, patch.status)?;
        patch.apply(demanda);
        Ok(demanda.clone())
    }

    async fn delete_demanda(&self, actor: Actor, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let demanda = state
            .demandas
            .get(&id)
            .ok_or(StoreError::NotFound("demanda"))?;
        lifecycle::ensure_can_delete_demanda(&actor, demanda)?;

        state.demandas.remove(&id);
        state.offers.retain(|_, o| o.demanda_id != id);
        state.feedback.retain(|_, f| f.demanda_id != id);
        Ok(())
    }

    async fn conclude_demanda(&self, actor: Actor, id: Uuid) -> StoreResult<Demanda> {
        let mut state = self.state.write().await;
        let demanda = state
            .demandas
            .get_mut(&id)
            .ok_or(StoreError::NotFound("demanda"))?;
        lifecycle::ensure_can_conclude(&actor, demanda)?;
        demanda.status = DemandaStatus::Completed;
        Ok(demanda.clone())
    }

    async fn create_offer(&self, actor: Actor, new: NewOffer) -> StoreResult<Offer> {
        let mut state = self.state.write().await;
        let demanda = state
            .demandas
            .get(&new.demanda_id)
            .ok_or(StoreError::NotFound("demanda"))?;
        let already_offered = state
            .offers
            .values()
            .any(|o| o.demanda_id == demanda.id && o.professional_id == actor.id);
        lifecycle::ensure_can_offer(&actor, demanda, already_offered)?;

        let offer = Offer {
            id: Uuid::new_v4(),
            demanda_id: new.demanda_id,
            professional_id: actor.id,
            value_cents: new.value_cents,
            term: new.term,
            status: OfferStatus::Pending,
            created_at: Utc::now(),
        };
        state.offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    async fn find_offer(&self, id: Uuid) -> StoreResult<Option<Offer>> {
        Ok(self.state.read().await.offers.get(&id).cloned())
    }

    async fn list_offers(&self, scope: OfferScope) -> StoreResult<Vec<Offer>> {
        let state = self.state.read().await;
        let mut found: Vec<Offer> = state
            .offers
            .values()
            .filter(|o| match scope {
                OfferScope::MadeBy(professional_id) => o.professional_id == professional_id,
                OfferScope::OnDemandasOf(client_id) => state
                    .demandas
                    .get(&o.demanda_id)
                    .is_some_and(|d| d.client_id == client_id),
            })
            .cloned()
            .collect();
        newest_first(&mut found, |o| o.created_at);
        Ok(found)
    }

    async fn accepted_offer(&self, demanda_id: Uuid) -> StoreResult<Option<Offer>> {
        let state = self.state.read().await;
        Ok(state
            .offers
            .values()
            .find(|o| o.demanda_id == demanda_id && o.status == OfferStatus::Accepted)
            .cloned())
    }

    async fn accept_offer(&self, actor: Actor, id: Uuid) -> StoreResult<Offer> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let mut chosen = state
            .offers
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("offer"))?;
        let demanda = state
            .demandas
            .get_mut(&chosen.demanda_id)
            .ok_or(StoreError::NotFound("demanda"))?;
        lifecycle::ensure_can_accept(&actor, demanda, &chosen)?;

        let (demanda_id, chosen_id) = (chosen.demanda_id, chosen.id);
        let siblings = state
            .offers
            .values_mut()
            .filter(move |o| o.demanda_id == demanda_id && o.id != chosen_id);
        lifecycle::apply_acceptance(demanda, &mut chosen, siblings);
        state.offers.insert(chosen.id, chosen.clone());
        Ok(chosen)
    }

    async fn withdraw_offer(&self, actor: Actor, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let offer = state.offers.get(&id).ok_or(StoreError::NotFound("offer"))?;
        lifecycle::ensure_can_withdraw_offer(&actor, offer)?;
        state.offers.remove(&id);
        Ok(())
    }

    async fn create_feedback(&self, actor: Actor, new: NewFeedback) -> StoreResult<Feedback> {
        let mut state = self.state.write().await;
        let demanda = state
            .demandas
            .get(&new.demanda_id)
            .ok_or(StoreError::NotFound("demanda"))?;
        let already_reviewed = state
            .feedback
            .values()
            .any(|f| f.demanda_id == demanda.id);
        lifecycle::ensure_can_leave_feedback(&actor, demanda, already_reviewed)?;
        let professional_id = demanda.professional_id.ok_or_else(|| {
            LifecycleError::InvalidState("The demanda has no assigned professional".to_string())
        })?;

        let feedback = Feedback {
            id: Uuid::new_v4(),
            demanda_id: new.demanda_id,
            client_id: actor.id,
            professional_id,
            rating: new.rating,
            comment: new.comment,
            created_at: Utc::now(),
        };
        state.feedback.insert(feedback.id, feedback.clone());
        Ok(feedback)
    }

    async fn find_feedback(&self, id: Uuid) -> StoreResult<Option<Feedback>> {
        Ok(self.state.read().await.feedback.get(&id).cloned())
    }

    async fn list_feedback(&self, client_id: Uuid) -> StoreResult<Vec<Feedback>> {
        let state = self.state.read().await;
        let mut found: Vec<Feedback> = state
            .feedback
            .values()
            .filter(|f| f.client_id == client_id)
            .cloned()
            .collect();
        newest_first(&mut found, |f| f.created_at);
        Ok(found)
    }
}
