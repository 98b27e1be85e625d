use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::{average_rating, MarketplaceStore, ServiceSeed, StoreError, StoreResult};
use crate::db::models::{AccountRow, DemandaRow, FeedbackRow, OfferRow, ServiceRow};
use crate::marketplace::lifecycle::{self, LifecycleError};
use crate::marketplace::{
    Account, AccountUpdate, Actor, Demanda, DemandaPatch, DemandaScope, DemandaStatus, Feedback,
    NewAccount, NewDemanda, NewFeedback, NewOffer, Offer, OfferScope, OfferStatus,
    ProfessionalStats, Profile, SearchTerm, Service,
};

const ACCOUNT_SELECT: &str = r#"
    SELECT u.id, u.email, u.password_hash, u.is_professional, u.date_joined,
           COALESCE(p.full_name, '') AS full_name,
           COALESCE(p.cpf, '') AS cpf,
           COALESCE(p.phone_number, '') AS phone_number,
           COALESCE(p.bio, '') AS bio,
           COALESCE(p.address, '') AS address,
           COALESCE(p.cep, '') AS cep,
           COALESCE(p.cidade, '') AS cidade,
           COALESCE(p.estado, '') AS estado,
           COALESCE(p.servico_principal, '') AS servico_principal,
           COALESCE(p.descricao_servicos, '') AS descricao_servicos,
           COALESCE(p.cnpj, '') AS cnpj,
           COALESCE(p.palavras_chave, '') AS palavras_chave
    FROM users u
    LEFT JOIN profiles p ON p.user_id = u.id
"#;

const DEMANDA_COLUMNS: &str =
    "id, client_id, professional_id, service_id, title, description, cep, status, created_at";

const OFFER_COLUMNS: &str =
    "id, demanda_id, professional_id, value_cents, term, status, created_at";

const FEEDBACK_COLUMNS: &str =
    "id, demanda_id, client_id, professional_id, rating, comment, created_at";

/// Postgres-backed store. Mutations run in a transaction and lock the
/// demanda row before any of its offers, so concurrent transitions on the
/// same demanda are serialized and cannot deadlock on each other.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn conflict_on_unique(err: sqlx::Error, msg: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(msg.to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn missing_service_on_fk(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::NotFound("service")
        }
        _ => StoreError::Database(err),
    }
}

fn convert_rows<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

async fn upsert_profile(
    conn: &mut PgConnection,
    user_id: Uuid,
    profile: &Profile,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO profiles (user_id, full_name, cpf, phone_number, bio, address, cep,
                              cidade, estado, servico_principal, descricao_servicos, cnpj,
                              palavras_chave)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (user_id) DO UPDATE SET
            full_name = EXCLUDED.full_name,
            cpf = EXCLUDED.cpf,
            phone_number = EXCLUDED.phone_number,
            bio = EXCLUDED.bio,
            address = EXCLUDED.address,
            cep = EXCLUDED.cep,
            cidade = EXCLUDED.cidade,
            estado = EXCLUDED.estado,
            servico_principal = EXCLUDED.servico_principal,
            descricao_servicos = EXCLUDED.descricao_servicos,
            cnpj = EXCLUDED.cnpj,
            palavras_chave = EXCLUDED.palavras_chave
        "#,
    )
    .bind(user_id)
    .bind(&profile.full_name)
    .bind(&profile.cpf)
    .bind(&profile.phone_number)
    .bind(&profile.bio)
    .bind(&profile.address)
    .bind(&profile.cep)
    .bind(&profile.cidade)
    .bind(&profile.estado)
    .bind(&profile.servico_principal)
    .bind(&profile.descricao_servicos)
    .bind(&profile.cnpj)
    .bind(&profile.palavras_chave)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn lock_demanda(conn: &mut PgConnection, id: Uuid) -> StoreResult<Demanda> {
    let sql = format!("SELECT {DEMANDA_COLUMNS} FROM demandas WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, DemandaRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::NotFound("demanda"))?;
    Demanda::try_from(row)
}

async fn lock_offer(conn: &mut PgConnection, id: Uuid) -> StoreResult<Offer> {
    let sql = format!("SELECT {OFFER_COLUMNS} FROM offers WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, OfferRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::NotFound("offer"))?;
    Offer::try_from(row)
}

async fn demanda_of_offer(conn: &mut PgConnection, offer_id: Uuid) -> StoreResult<Uuid> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT demanda_id FROM offers WHERE id = $1")
        .bind(offer_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|(id,)| id).ok_or(StoreError::NotFound("offer"))
}

#[async_trait]
impl MarketplaceStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<Duration> {
        let start = Instant::now();
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(start.elapsed())
    }

    async fn create_account(&self, new: NewAccount) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"INSERT INTO users (id, email, password_hash, is_professional, date_joined)
               VALUES ($1, $2, $3, $4, now())"#,
        )
        .bind(id)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.is_professional)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Email already registered"))?;

        upsert_profile(&mut tx, id, &new.profile).await?;

        let sql = format!("{ACCOUNT_SELECT} WHERE u.id = $1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let sql = format!("{ACCOUNT_SELECT} WHERE u.id = $1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Account::from))
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let sql = format!("{ACCOUNT_SELECT} WHERE LOWER(u.email) = LOWER($1)");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Account::from))
    }

    async fn update_account(&self, id: Uuid, update: AccountUpdate) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{ACCOUNT_SELECT} WHERE u.id = $1 FOR UPDATE OF u");
        let mut account: Account = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("account"))?
            .into();

        update.apply_to(&mut account);

        sqlx::query("UPDATE users SET is_professional = $2 WHERE id = $1")
            .bind(id)
            .bind(account.user.is_professional)
            .execute(&mut *tx)
            .await?;
        // Creates the profile on first write if the account never had one.
        upsert_profile(&mut tx, id, &account.profile).await?;

        tx.commit().await?;
        Ok(account)
    }

    async fn list_professionals(&self, search: &SearchTerm) -> StoreResult<Vec<Account>> {
        let sql = format!(
            r#"{ACCOUNT_SELECT}
            WHERE u.is_professional
              AND ($1::text IS NULL
                   OR LOWER(u.email) = $1
                   OR p.full_name ILIKE $2
                   OR p.palavras_chave ILIKE $2
                   OR p.cidade ILIKE $2)
            ORDER BY u.email"#
        );
        let rows = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(search.as_str())
            .bind(search.like_pattern())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn professional_stats(&self, id: Uuid) -> StoreResult<ProfessionalStats> {
        let (sum, count): (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(rating), 0)::BIGINT, COUNT(*)::BIGINT \
             FROM feedback WHERE professional_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let (demands_completed,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*)::BIGINT FROM demandas WHERE professional_id = $1 AND status = $2",
        )
        .bind(id)
        .bind(DemandaStatus::Completed.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(ProfessionalStats {
            rating: average_rating(sum, count),
            feedback_count: count,
            demands_completed,
        })
    }

    async fn list_services(&self) -> StoreResult<Vec<Service>> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, name, description, icon FROM services ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Service::from).collect())
    }

    async fn find_service(&self, id: Uuid) -> StoreResult<Option<Service>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, name, description, icon FROM services WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Service::from))
    }

    async fn seed_services(&self, seeds: &[ServiceSeed]) -> StoreResult<usize> {
        let mut added = 0;
        for seed in seeds {
            let result = sqlx::query(
                r#"INSERT INTO services (id, name, description, icon)
                   VALUES ($1, $2, $3, $4)
                   ON CONFLICT (name) DO NOTHING"#,
            )
            .bind(Uuid::new_v4())
            .bind(seed.name)
            .bind(seed.description)
            .bind(seed.icon)
            .execute(&self.pool)
            .await?;
            added += result.rows_affected() as usize;
        }
        Ok(added)
    }

    async fn create_demanda(&self, actor: Actor, new: NewDemanda) -> StoreResult<Demanda> {
        lifecycle::ensure_can_create_demanda(&actor)?;

        let sql = format!(
            r#"INSERT INTO demandas (id, client_id, service_id, title, description, cep, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, now())
               RETURNING {DEMANDA_COLUMNS}"#
        );
        let row = sqlx::query_as::<_, DemandaRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(actor.id)
            .bind(new.service_id)
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.cep)
            .bind(DemandaStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(missing_service_on_fk)?;
        Demanda::try_from(row)
    }

    async fn find_demanda(&self, id: Uuid) -> StoreResult<Option<Demanda>> {
        let sql = format!("SELECT {DEMANDA_COLUMNS} FROM demandas WHERE id = $1");
        sqlx::query_as::<_, DemandaRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Demanda::try_from)
            .transpose()
    }

    async fn list_demandas(
        &self,
        scope: DemandaScope,
        search: &SearchTerm,
    ) -> StoreResult<Vec<Demanda>> {
        let (client_id, status) = match scope {
            DemandaScope::OwnedBy(client_id) => (Some(client_id), None),
            DemandaScope::OpenForOffers => (None, Some(DemandaStatus::Pending.as_str())),
        };

        let rows = sqlx::query_as::<_, DemandaRow>(
            r#"
            SELECT d.id, d.client_id, d.professional_id, d.service_id, d.title,
                   d.description, d.cep, d.status, d.created_at
            FROM demandas d
            JOIN services s ON s.id = d.service_id
            WHERE ($1::uuid IS NULL OR d.client_id = $1)
              AND ($2::text IS NULL OR d.status = $2)
              AND ($3::text IS NULL
                   OR d.title ILIKE $3
                   OR d.description ILIKE $3
                   OR d.cep ILIKE $3
                   OR s.name ILIKE $3)
            ORDER BY d.created_at DESC
            "#,
        )
        .bind(client_id)
        .bind(status)
        .bind(search.like_pattern())
        .fetch_all(&self.pool)
        .await?;
        convert_rows(rows)
    }

    async fn update_demanda(
        &self,
        actor: Actor,
        id: Uuid,
        patch: DemandaPatch,
    ) -> StoreResult<Demanda> {
        let mut tx = self.pool.begin().await?;
        let mut demanda = lock_demanda(&mut tx, id).await?;
        lifecycle::ensure_can_edit_demanda(&actor, &demanda, patch.status)?;
        patch.apply(&mut demanda);

        sqlx::query(
            r#"UPDATE demandas
               SET service_id = $2, title = $3, description = $4, cep = $5
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(demanda.service_id)
        .bind(&demanda.title)
        .bind(&demanda.description)
        .bind(&demanda.cep)
        .execute(&mut *tx)
        .await
        .map_err(missing_service_on_fk)?;

        tx.commit().await?;
        Ok(demanda)
    }

    async fn delete_demanda(&self, actor: Actor, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let demanda = lock_demanda(&mut tx, id).await?;
        lifecycle::ensure_can_delete_demanda(&actor, &demanda)?;

        // Offers and feedback go with it (ON DELETE CASCADE).
        sqlx::query("DELETE FROM demandas WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn conclude_demanda(&self, actor: Actor, id: Uuid) -> StoreResult<Demanda> {
        let mut tx = self.pool.begin().await?;
        let mut demanda = lock_demanda(&mut tx, id).await?;
        lifecycle::ensure_can_conclude(&actor, &demanda)?;
        demanda.status = DemandaStatus::Completed;

        sqlx::query("UPDATE demandas SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(demanda.status.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(demanda)
    }

    async fn create_offer(&self, actor: Actor, new: NewOffer) -> StoreResult<Offer> {
        let mut tx = self.pool.begin().await?;
        let demanda = lock_demanda(&mut tx, new.demanda_id).await?;

        let (already_offered,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM offers WHERE demanda_id = $1 AND professional_id = $2)",
        )
        .bind(demanda.id)
        .bind(actor.id)
        .fetch_one(&mut *tx)
        .await?;
        lifecycle::ensure_can_offer(&actor, &demanda, already_offered)?;

        let sql = format!(
            r#"INSERT INTO offers (id, demanda_id, professional_id, value_cents, term, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, now())
               RETURNING {OFFER_COLUMNS}"#
        );
        let row = sqlx::query_as::<_, OfferRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(demanda.id)
            .bind(actor.id)
            .bind(new.value_cents)
            .bind(&new.term)
            .bind(OfferStatus::Pending.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "You already made an offer for this demanda"))?;

        tx.commit().await?;
        Offer::try_from(row)
    }

    async fn find_offer(&self, id: Uuid) -> StoreResult<Option<Offer>> {
        let sql = format!("SELECT {OFFER_COLUMNS} FROM offers WHERE id = $1");
        sqlx::query_as::<_, OfferRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Offer::try_from)
            .transpose()
    }

    async fn list_offers(&self, scope: OfferScope) -> StoreResult<Vec<Offer>> {
        let (professional_id, client_id) = match scope {
            OfferScope::MadeBy(id) => (Some(id), None),
            OfferScope::OnDemandasOf(id) => (None, Some(id)),
        };

        let rows = sqlx::query_as::<_, OfferRow>(
            r#"
            SELECT o.id, o.demanda_id, o.professional_id, o.value_cents, o.term,
                   o.status, o.created_at
            FROM offers o
            JOIN demandas d ON d.id = o.demanda_id
            WHERE ($1::uuid IS NULL OR o.professional_id = $1)
              AND ($2::uuid IS NULL OR d.client_id = $2)
            ORDER BY o.created_at DESC
            "#,
        )
        .bind(professional_id)
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        convert_rows(rows)
    }

    async fn accepted_offer(&self, demanda_id: Uuid) -> StoreResult<Option<Offer>> {
        let sql =
            format!("SELECT {OFFER_COLUMNS} FROM offers WHERE demanda_id = $1 AND status = $2");
        sqlx::query_as::<_, OfferRow>(&sql)
            .bind(demanda_id)
            .bind(OfferStatus::Accepted.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Offer::try_from)
            .transpose()
    }

    async fn accept_offer(&self, actor: Actor, id: Uuid) -> StoreResult<Offer> {
        let mut tx = self.pool.begin().await?;
        let demanda_id = demanda_of_offer(&mut tx, id).await?;
        let mut demanda = lock_demanda(&mut tx, demanda_id).await?;
        let mut chosen = lock_offer(&mut tx, id).await?;
        lifecycle::ensure_can_accept(&actor, &demanda, &chosen)?;

        // Siblings are rejected in bulk below.
        lifecycle::apply_acceptance(&mut demanda, &mut chosen, std::iter::empty());

        sqlx::query("UPDATE offers SET status = $2 WHERE id = $1")
            .bind(chosen.id)
            .bind(chosen.status.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE demandas SET status = $2, professional_id = $3 WHERE id = $1")
            .bind(demanda.id)
            .bind(demanda.status.as_str())
            .bind(demanda.professional_id)
            .execute(&mut *tx)
            .await?;

        let rejected = sqlx::query(
            "UPDATE offers SET status = $3 WHERE demanda_id = $1 AND id <> $2",
        )
        .bind(demanda.id)
        .bind(chosen.id)
        .bind(OfferStatus::Rejected.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(
            demanda_id = %demanda.id,
            offer_id = %chosen.id,
            rejected = rejected.rows_affected(),
            "offer acceptance committed"
        );
        Ok(chosen)
    }

    async fn withdraw_offer(&self, actor: Actor, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let demanda_id = demanda_of_offer(&mut tx, id).await?;
        lock_demanda(&mut tx, demanda_id).await?;
        let offer = lock_offer(&mut tx, id).await?;
        lifecycle::ensure_can_withdraw_offer(&actor, &offer)?;

        sqlx::query("DELETE FROM offers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_feedback(&self, actor: Actor, new: NewFeedback) -> StoreResult<Feedback> {
        let mut tx = self.pool.begin().await?;
        let demanda = lock_demanda(&mut tx, new.demanda_id).await?;

        let (already_reviewed,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM feedback WHERE demanda_id = $1)")
                .bind(demanda.id)
                .fetch_one(&mut *tx)
                .await?;
        lifecycle::ensure_can_leave_feedback(&actor, &demanda, already_reviewed)?;
        let professional_id = demanda.professional_id.ok_or_else(|| {
            LifecycleError::InvalidState("The demanda has no assigned professional".to_string())
        })?;

        let sql = format!(
            r#"INSERT INTO feedback (id, demanda_id, client_id, professional_id, rating, comment, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, now())
               RETURNING {FEEDBACK_COLUMNS}"#
        );
        let row = sqlx::query_as::<_, FeedbackRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(demanda.id)
            .bind(actor.id)
            .bind(professional_id)
            .bind(new.rating)
            .bind(&new.comment)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "This demanda already has feedback"))?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn find_feedback(&self, id: Uuid) -> StoreResult<Option<Feedback>> {
        let sql = format!("SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE id = $1");
        let row = sqlx::query_as::<_, FeedbackRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Feedback::from))
    }

    async fn list_feedback(&self, client_id: Uuid) -> StoreResult<Vec<Feedback>> {
        let sql = format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE client_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, FeedbackRow>(&sql)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Feedback::from).collect())
    }
}
