//! Domain records shared by the stores and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{DemandaStatus, OfferStatus, Role};

/// Account identity. The email is the login key and is unique case-insensitively.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_professional: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_flag(self.is_professional)
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role(),
        }
    }
}

/// The authenticated caller as the lifecycle rules see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn is_professional(&self) -> bool {
        self.role == Role::Professional
    }
}

/// One-to-one extension of a [`User`]. Blank fields are stored as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub full_name: String,
    pub cpf: String,
    pub phone_number: String,
    pub bio: String,
    pub address: String,
    pub cep: String,
    pub cidade: String,
    pub estado: String,
    pub servico_principal: String,
    pub descricao_servicos: String,
    pub cnpj: String,
    pub palavras_chave: String,
}

impl Profile {
    /// Clears the fields that only make sense for professionals.
    pub fn clear_professional_fields(&mut self) {
        self.servico_principal.clear();
        self.descricao_servicos.clear();
        self.cnpj.clear();
        self.palavras_chave.clear();
    }

    pub fn apply(&mut self, patch: &ProfilePatch) {
        fn set(field: &mut String, value: &Option<String>) {
            if let Some(v) = value {
                *field = v.trim().to_string();
            }
        }

        set(&mut self.full_name, &patch.full_name);
        set(&mut self.cpf, &patch.cpf);
        set(&mut self.phone_number, &patch.phone_number);
        set(&mut self.bio, &patch.bio);
        set(&mut self.address, &patch.address);
        set(&mut self.cep, &patch.cep);
        set(&mut self.cidade, &patch.cidade);
        set(&mut self.estado, &patch.estado);
        set(&mut self.servico_principal, &patch.servico_principal);
        set(&mut self.descricao_servicos, &patch.descricao_servicos);
        set(&mut self.cnpj, &patch.cnpj);
        set(&mut self.palavras_chave, &patch.palavras_chave);
    }
}

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub cpf: Option<String>,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub address: Option<String>,
    pub cep: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
    pub servico_principal: Option<String>,
    pub descricao_servicos: Option<String>,
    pub cnpj: Option<String>,
    pub palavras_chave: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub user: User,
    pub profile: Profile,
}

impl Account {
    /// Profile full name, falling back to the email.
    pub fn display_name(&self) -> String {
        if self.profile.full_name.is_empty() {
            self.user.email.clone()
        } else {
            self.profile.full_name.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub is_professional: bool,
    pub profile: Profile,
}

/// Role switch plus partial profile update, applied as one unit.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub is_professional: Option<bool>,
    pub profile: Option<ProfilePatch>,
}

impl AccountUpdate {
    /// Applies the update to an account in memory. Changing the role resets the
    /// professional-only profile fields before the patch is applied.
    pub fn apply_to(&self, account: &mut Account) {
        if let Some(flag) = self.is_professional {
            if flag != account.user.is_professional {
                account.user.is_professional = flag;
                account.profile.clear_professional_fields();
            }
        }
        if let Some(patch) = &self.profile {
            account.profile.apply(patch);
        }
    }
}

/// Aggregates shown on a professional's profile.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfessionalStats {
    pub rating: f64,
    pub feedback_count: i64,
    pub demands_completed: i64,
}

/// Static catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone)]
pub struct Demanda {
    pub id: Uuid,
    pub client_id: Uuid,
    pub professional_id: Option<Uuid>,
    pub service_id: Uuid,
    pub title: String,
    pub description: String,
    pub cep: String,
    pub status: DemandaStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDemanda {
    pub service_id: Uuid,
    pub title: String,
    pub description: String,
    pub cep: String,
}

/// Client edit of a pending demanda. `status` is only carried so the rules can
/// reject attempts to change it.
#[derive(Debug, Clone, Default)]
pub struct DemandaPatch {
    pub service_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub cep: Option<String>,
    pub status: Option<DemandaStatus>,
}

impl DemandaPatch {
    pub fn apply(&self, demanda: &mut Demanda) {
        if let Some(service_id) = self.service_id {
            demanda.service_id = service_id;
        }
        if let Some(title) = &self.title {
            demanda.title = title.clone();
        }
        if let Some(description) = &self.description {
            demanda.description = description.clone();
        }
        if let Some(cep) = &self.cep {
            demanda.cep = cep.clone();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Offer {
    pub id: Uuid,
    pub demanda_id: Uuid,
    pub professional_id: Uuid,
    pub value_cents: i64,
    pub term: String,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOffer {
    pub demanda_id: Uuid,
    pub value_cents: i64,
    pub term: String,
}

#[derive(Debug, Clone)]
pub struct Feedback {
    pub id: Uuid,
    pub demanda_id: Uuid,
    pub client_id: Uuid,
    pub professional_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub demanda_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
}

/// Which demandas a caller may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandaScope {
    /// A client sees the demandas they created.
    OwnedBy(Uuid),
    /// A professional sees every demanda still open for offers.
    OpenForOffers,
}

impl DemandaScope {
    pub fn for_actor(actor: &Actor) -> Self {
        match actor.role {
            Role::Client => DemandaScope::OwnedBy(actor.id),
            Role::Professional => DemandaScope::OpenForOffers,
        }
    }

    pub fn includes(&self, demanda: &Demanda) -> bool {
        match self {
            DemandaScope::OwnedBy(client_id) => demanda.client_id == *client_id,
            DemandaScope::OpenForOffers => demanda.status == DemandaStatus::Pending,
        }
    }
}

/// Which offers a caller may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferScope {
    MadeBy(Uuid),
    OnDemandasOf(Uuid),
}

impl OfferScope {
    pub fn for_actor(actor: &Actor) -> Self {
        match actor.role {
            Role::Professional => OfferScope::MadeBy(actor.id),
            Role::Client => OfferScope::OnDemandasOf(actor.id),
        }
    }
}

/// Case-insensitive free-text filter used by the list endpoints.
#[derive(Debug, Clone, Default)]
pub struct SearchTerm(Option<String>);

impl SearchTerm {
    pub fn new(raw: Option<&str>) -> Self {
        let term = raw
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        SearchTerm(term)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// True when no term is set or any haystack contains it.
    pub fn matches_any<'a>(&self, haystacks: impl IntoIterator<Item = &'a str>) -> bool {
        match &self.0 {
            None => true,
            Some(term) => haystacks
                .into_iter()
                .any(|h| h.to_lowercase().contains(term.as_str())),
        }
    }

    /// SQL `ILIKE` pattern for the term.
    pub fn like_pattern(&self) -> Option<String> {
        self.0.as_ref().map(|t| {
            let escaped = t
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(is_professional: bool) -> Account {
        Account {
            user: User {
                id: Uuid::new_v4(),
                email: "pro@example.com".to_string(),
                password_hash: String::new(),
                is_professional,
                date_joined: Utc::now(),
            },
            profile: Profile {
                full_name: "Ana Souza".to_string(),
                servico_principal: "Eletricista".to_string(),
                palavras_chave: "tomada fiação".to_string(),
                cnpj: "12345678000199".to_string(),
                ..Profile::default()
            },
        }
    }

    #[test]
    fn test_role_switch_clears_professional_fields() {
        let mut acc = account(true);
        let update = AccountUpdate {
            is_professional: Some(false),
            profile: None,
        };
        update.apply_to(&mut acc);
        assert!(!acc.user.is_professional);
        assert!(acc.profile.servico_principal.is_empty());
        assert!(acc.profile.palavras_chave.is_empty());
        assert!(acc.profile.cnpj.is_empty());
        assert_eq!(acc.profile.full_name, "Ana Souza");
    }

    #[test]
    fn test_same_role_keeps_professional_fields() {
        let mut acc = account(true);
        let update = AccountUpdate {
            is_professional: Some(true),
            profile: Some(ProfilePatch {
                cidade: Some("Recife".to_string()),
                ..ProfilePatch::default()
            }),
        };
        update.apply_to(&mut acc);
        assert_eq!(acc.profile.servico_principal, "Eletricista");
        assert_eq!(acc.profile.cidade, "Recife");
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let mut acc = account(false);
        assert_eq!(acc.display_name(), "Ana Souza");
        acc.profile.full_name.clear();
        assert_eq!(acc.display_name(), "pro@example.com");
    }

    #[test]
    fn test_search_term_matching() {
        let term = SearchTerm::new(Some("  ELETR "));
        assert!(term.matches_any(["Eletricista", "x"]));
        assert!(!term.matches_any(["Encanador"]));
        assert!(SearchTerm::new(Some("   ")).matches_any(["anything"]));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        let term = SearchTerm::new(Some("50%_off"));
        assert_eq!(term.like_pattern().as_deref(), Some("%50\\%\\_off%"));
    }

    #[test]
    fn test_demanda_scope_for_roles() {
        let client = Actor {
            id: Uuid::new_v4(),
            role: Role::Client,
        };
        let pro = Actor {
            id: Uuid::new_v4(),
            role: Role::Professional,
        };
        assert_eq!(DemandaScope::for_actor(&client), DemandaScope::OwnedBy(client.id));
        assert_eq!(DemandaScope::for_actor(&pro), DemandaScope::OpenForOffers);
        assert_eq!(OfferScope::for_actor(&pro), OfferScope::MadeBy(pro.id));
    }
}
