//! Database rows (sqlx) and their conversion into marketplace records.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::marketplace::{
    Account, Demanda, DemandaStatus, Feedback, Offer, OfferStatus, Profile, Service, User,
};
use crate::store::StoreError;

/// `users` joined with `profiles`; missing profile columns come back as ''.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_professional: bool,
    pub date_joined: DateTime<Utc>,
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

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            user: User {
                id: row.id,
                email: row.email,
                password_hash: row.password_hash,
                is_professional: row.is_professional,
                date_joined: row.date_joined,
            },
            profile: Profile {
                full_name: row.full_name,
                cpf: row.cpf,
                phone_number: row.phone_number,
                bio: row.bio,
                address: row.address,
                cep: row.cep,
                cidade: row.cidade,
                estado: row.estado,
                servico_principal: row.servico_principal,
                descricao_servicos: row.descricao_servicos,
                cnpj: row.cnpj,
                palavras_chave: row.palavras_chave,
            },
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon: String,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            id: row.id,
            name: row.name,
            description: row.description,
            icon: row.icon,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DemandaRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub professional_id: Option<Uuid>,
    pub service_id: Uuid,
    pub title: String,
    pub description: String,
    pub cep: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DemandaRow> for Demanda {
    type Error = StoreError;

    fn try_from(row: DemandaRow) -> Result<Self, Self::Error> {
        let status: DemandaStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("demanda {}: {}", row.id, e)))?;
        Ok(Demanda {
            id: row.id,
            client_id: row.client_id,
            professional_id: row.professional_id,
            service_id: row.service_id,
            title: row.title,
            description: row.description,
            cep: row.cep,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OfferRow {
    pub id: Uuid,
    pub demanda_id: Uuid,
    pub professional_id: Uuid,
    pub value_cents: i64,
    pub term: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<OfferRow> for Offer {
    type Error = StoreError;

    fn try_from(row: OfferRow) -> Result<Self, Self::Error> {
        let status: OfferStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("offer {}: {}", row.id, e)))?;
        Ok(Offer {
            id: row.id,
            demanda_id: row.demanda_id,
            professional_id: row.professional_id,
            value_cents: row.value_cents,
            term: row.term,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FeedbackRow {
    pub id: Uuid,
    pub demanda_id: Uuid,
    pub client_id: Uuid,
    pub professional_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<FeedbackRow> for Feedback {
    fn from(row: FeedbackRow) -> Self {
        Feedback {
            id: row.id,
            demanda_id: row.demanda_id,
            client_id: row.client_id,
            professional_id: row.professional_id,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demanda_row(status: &str) -> DemandaRow {
        DemandaRow {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            professional_id: None,
            service_id: Uuid::new_v4(),
            title: "Pintura".to_string(),
            description: "Sala".to_string(),
            cep: "01001000".to_string(),
            status: status.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_demanda_row_parses_status() {
        let demanda = Demanda::try_from(demanda_row("in_progress")).unwrap();
        assert_eq!(demanda.status, DemandaStatus::InProgress);
    }

    #[test]
    fn test_demanda_row_with_unknown_status_is_corrupt() {
        let err = Demanda::try_from(demanda_row("em_andamento")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
