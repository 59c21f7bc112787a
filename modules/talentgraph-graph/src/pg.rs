//! PgStore: every repository interface backed by Postgres.
//!
//! Multi-row units of work open one transaction and commit at the end; any
//! early return drops the transaction, which rolls it back.

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use talentgraph_common::types::{
    add_alias, AffiliationFact, ContentItem, EdgeKey, ExternalId, InfluenceSignals, OrgType,
    Organization, Person, PersonMetrics, RelationEdge, RelationType,
};
use talentgraph_common::{LinkType, TalentGraphError};

use crate::store::{
    ContentRepository, EntityRepository, OrgMergePlan, OrganizationRepository, PersonIngestPlan,
    RelationChanges, RelationRepository,
};

const PEOPLE_EXTERNAL_ID_KEY: &str = "people_external_id_key";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Turn a failed person write into `IdentifierConflict` when the unique
    /// external-id index rejected it.
    async fn person_write_error(&self, person: &Person, err: sqlx::Error) -> anyhow::Error {
        let taken = matches!(
            &err,
            sqlx::Error::Database(db) if db.constraint() == Some(PEOPLE_EXTERNAL_ID_KEY)
        );
        if let (true, Some(ext)) = (taken, &person.external_id) {
            return match self.conflict_for(person, ext).await {
                Ok(conflict) => conflict.into(),
                Err(e) => e,
            };
        }
        anyhow::Error::new(err).context(format!("Failed to write person {}", person.name))
    }

    async fn conflict_for(
        &self,
        person: &Person,
        external_id: &ExternalId,
    ) -> Result<TalentGraphError> {
        let existing = self
            .find_person_by_external_id(external_id)
            .await?
            .ok_or_else(|| anyhow!("external id {external_id} reported taken but not found"))?;
        Ok(TalentGraphError::IdentifierConflict {
            external_id: external_id.clone(),
            existing_id: existing.id,
            existing_name: existing.name,
            candidate_name: person.name.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct PersonRow {
    id: Uuid,
    name: String,
    localized_name: Option<String>,
    aliases: Vec<String>,
    external_id: Option<String>,
    topics: Vec<String>,
    influence_score: f64,
    topic_ranks: Json<BTreeMap<String, u32>>,
    created_at: DateTime<Utc>,
}

impl From<PersonRow> for Person {
    fn from(row: PersonRow) -> Self {
        Person {
            id: row.id,
            name: row.name,
            localized_name: row.localized_name,
            aliases: row.aliases,
            external_id: row.external_id.map(ExternalId::new),
            topics: row.topics.into_iter().collect(),
            influence_score: row.influence_score,
            topic_ranks: row.topic_ranks.0,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrganizationRow {
    id: Uuid,
    name: String,
    localized_name: Option<String>,
    external_id: Option<String>,
    org_type: String,
    created_at: DateTime<Utc>,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: row.id,
            name: row.name,
            localized_name: row.localized_name,
            external_id: row.external_id.map(ExternalId::new),
            org_type: OrgType::from_str(&row.org_type).unwrap_or(OrgType::Other),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AffiliationRow {
    id: Uuid,
    person_id: Uuid,
    organization_id: Uuid,
    role: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl From<AffiliationRow> for AffiliationFact {
    fn from(row: AffiliationRow) -> Self {
        AffiliationFact {
            id: row.id,
            person_id: row.person_id,
            organization_id: row.organization_id,
            role: row.role,
            start_date: row.start_date,
            end_date: row.end_date,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RelationRow {
    id: Uuid,
    source_id: Uuid,
    target_id: Uuid,
    relation_type: String,
    description: String,
    provenance: String,
    confidence: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<RelationRow> for RelationEdge {
    type Error = anyhow::Error;

    fn try_from(row: RelationRow) -> Result<Self> {
        let relation = RelationType::from_str(&row.relation_type)
            .map_err(|e| anyhow!("relation {}: {e}", row.id))?;
        Ok(RelationEdge {
            id: row.id,
            source_id: row.source_id,
            target_id: row.target_id,
            relation,
            description: row.description,
            provenance: row.provenance,
            confidence: row.confidence,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContentRow {
    id: Uuid,
    person_id: Uuid,
    organization_id: Option<Uuid>,
    link: Json<LinkType>,
    summary: String,
    first_party: bool,
    created_at: DateTime<Utc>,
}

impl From<ContentRow> for ContentItem {
    fn from(row: ContentRow) -> Self {
        ContentItem {
            id: row.id,
            person_id: row.person_id,
            organization_id: row.organization_id,
            link: row.link.0,
            summary: row.summary,
            first_party: row.first_party,
            created_at: row.created_at,
        }
    }
}

const PERSON_COLUMNS: &str = "id, name, localized_name, aliases, external_id, topics, \
                              influence_score, topic_ranks, created_at";
const RELATION_COLUMNS: &str =
    "id, source_id, target_id, relation_type, description, provenance, confidence, created_at";

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn insert_person(person: &Person) -> PgQuery<'_> {
    let topics: Vec<String> = person.topics.iter().cloned().collect();
    sqlx::query(
        r#"
        INSERT INTO people (
            id, name, localized_name, aliases, external_id, topics, influence_score,
            topic_ranks, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(person.id)
    .bind(&person.name)
    .bind(&person.localized_name)
    .bind(&person.aliases)
    .bind(person.external_id.as_ref().map(ExternalId::as_str))
    .bind(topics)
    .bind(person.influence_score)
    .bind(Json(&person.topic_ranks))
    .bind(person.created_at)
}

fn insert_organization(org: &Organization) -> PgQuery<'_> {
    sqlx::query(
        r#"
        INSERT INTO organizations (id, name, localized_name, external_id, org_type, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(org.id)
    .bind(&org.name)
    .bind(&org.localized_name)
    .bind(org.external_id.as_ref().map(ExternalId::as_str))
    .bind(org.org_type.to_string())
    .bind(org.created_at)
}

fn insert_affiliation(fact: &AffiliationFact) -> PgQuery<'_> {
    sqlx::query(
        r#"
        INSERT INTO affiliations (id, person_id, organization_id, role, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(fact.id)
    .bind(fact.person_id)
    .bind(fact.organization_id)
    .bind(&fact.role)
    .bind(fact.start_date)
    .bind(fact.end_date)
}

fn insert_content(item: &ContentItem) -> PgQuery<'_> {
    sqlx::query(
        r#"
        INSERT INTO content_items (
            id, person_id, organization_id, link, summary, first_party, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(item.id)
    .bind(item.person_id)
    .bind(item.organization_id)
    .bind(Json(&item.link))
    .bind(&item.summary)
    .bind(item.first_party)
    .bind(item.created_at)
}

// ---------------------------------------------------------------------------
// EntityRepository
// ---------------------------------------------------------------------------

#[async_trait]
impl EntityRepository for PgStore {
    async fn list_people(&self) -> Result<Vec<Person>> {
        let rows = sqlx::query_as::<_, PersonRow>(&format!(
            "SELECT {PERSON_COLUMNS} FROM people ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Person::from).collect())
    }

    async fn get_person(&self, id: Uuid) -> Result<Option<Person>> {
        let row = sqlx::query_as::<_, PersonRow>(&format!(
            "SELECT {PERSON_COLUMNS} FROM people WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Person::from))
    }

    async fn find_person_by_external_id(&self, external_id: &ExternalId) -> Result<Option<Person>> {
        let row = sqlx::query_as::<_, PersonRow>(&format!(
            "SELECT {PERSON_COLUMNS} FROM people WHERE external_id = $1"
        ))
        .bind(external_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Person::from))
    }

    async fn create_person(&self, person: &Person) -> Result<()> {
        match insert_person(person).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.person_write_error(person, e).await),
        }
    }

    async fn set_external_id(&self, id: Uuid, external_id: &ExternalId) -> Result<()> {
        let mut person = self
            .get_person(id)
            .await?
            .ok_or_else(|| anyhow!("person {id} not found"))?;
        let result = sqlx::query(
            "UPDATE people SET external_id = $2 WHERE id = $1 AND external_id IS NULL",
        )
        .bind(id)
        .bind(external_id.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(()),
            Ok(_) => Err(anyhow!("person {id} already has an external id")),
            Err(e) => {
                person.external_id = Some(external_id.clone());
                Err(self.person_write_error(&person, e).await)
            }
        }
    }

    async fn apply_ingest(&self, plan: &PersonIngestPlan) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(person) = &plan.person {
            if let Err(e) = insert_person(person).execute(&mut *tx).await {
                return Err(self.person_write_error(person, e).await);
            }
        }
        for org in &plan.organizations {
            insert_organization(org)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert organization {}", org.name))?;
        }
        for fact in &plan.affiliations {
            insert_affiliation(fact).execute(&mut *tx).await?;
        }
        for item in &plan.content {
            insert_content(item).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn add_aliases(&self, id: Uuid, aliases: &[String]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, (String, Vec<String>)>(
            "SELECT name, aliases FROM people WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((name, mut current)) = row else {
            return Err(anyhow!("person {id} not found"));
        };

        let added = aliases
            .iter()
            .filter(|alias| add_alias(&mut current, &name, (*alias).clone()))
            .count();
        if added > 0 {
            sqlx::query("UPDATE people SET aliases = $2 WHERE id = $1")
                .bind(id)
                .bind(&current)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(added)
    }

    async fn set_localized_name(&self, id: Uuid, localized_name: &str) -> Result<()> {
        sqlx::query("UPDATE people SET localized_name = $2 WHERE id = $1")
            .bind(id)
            .bind(localized_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn influence_signals(&self, id: Uuid) -> Result<InfluenceSignals> {
        let row = sqlx::query_as::<_, (i64, i64, i32, Option<f64>, i64)>(
            r#"
            SELECT COALESCE(s.popularity, 0),
                   COALESCE(s.citations, 0),
                   COALESCE(s.h_index, 0),
                   s.qualitative_rating,
                   (SELECT COUNT(*) FROM content_items c WHERE c.person_id = p.id)
            FROM people p
            LEFT JOIN person_signals s ON s.person_id = p.id
            WHERE p.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow!("person {id} not found"))?;

        let (popularity, citations, h_index, qualitative_rating, content_items) = row;
        Ok(InfluenceSignals {
            content_items: content_items.max(0) as u64,
            popularity: popularity.max(0) as u64,
            citations: citations.max(0) as u64,
            h_index: h_index.max(0) as u32,
            qualitative_rating,
        })
    }

    async fn upsert_signals(&self, id: Uuid, signals: &InfluenceSignals) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO person_signals (
                person_id, popularity, citations, h_index, qualitative_rating
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (person_id) DO UPDATE
            SET popularity = EXCLUDED.popularity,
                citations = EXCLUDED.citations,
                h_index = EXCLUDED.h_index,
                qualitative_rating = EXCLUDED.qualitative_rating
            "#,
        )
        .bind(id)
        .bind(i64::try_from(signals.popularity).unwrap_or(i64::MAX))
        .bind(i64::try_from(signals.citations).unwrap_or(i64::MAX))
        .bind(i32::try_from(signals.h_index).unwrap_or(i32::MAX))
        .bind(signals.qualitative_rating)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_metrics(&self, metrics: &[PersonMetrics]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for m in metrics {
            let updated = sqlx::query(
                "UPDATE people SET influence_score = $2, topic_ranks = $3 WHERE id = $1",
            )
            .bind(m.person_id)
            .bind(m.influence_score)
            .bind(Json(&m.topic_ranks))
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                return Err(anyhow!("person {} not found", m.person_id));
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OrganizationRepository
// ---------------------------------------------------------------------------

#[async_trait]
impl OrganizationRepository for PgStore {
    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        let rows = sqlx::query_as::<_, OrganizationRow>(
            r#"
            SELECT id, name, localized_name, external_id, org_type, created_at
            FROM organizations
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Organization::from).collect())
    }

    async fn create_organization(&self, org: &Organization) -> Result<()> {
        insert_organization(org)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert organization {}", org.name))?;
        Ok(())
    }

    async fn list_affiliations(&self) -> Result<Vec<AffiliationFact>> {
        let rows = sqlx::query_as::<_, AffiliationRow>(
            "SELECT id, person_id, organization_id, role, start_date, end_date FROM affiliations",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AffiliationFact::from).collect())
    }

    async fn add_affiliation(&self, fact: &AffiliationFact) -> Result<()> {
        insert_affiliation(fact).execute(&self.pool).await?;
        Ok(())
    }

    async fn apply_merge(&self, plan: &OrgMergePlan) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query("UPDATE affiliations SET organization_id = $1 WHERE id = ANY($2)")
            .bind(plan.survivor_id)
            .bind(&plan.repoint_affiliations)
            .execute(&mut *tx)
            .await?;
        if moved.rows_affected() as usize != plan.repoint_affiliations.len() {
            return Err(anyhow!("merge into {}: affiliation set changed", plan.survivor_id));
        }

        sqlx::query("DELETE FROM affiliations WHERE id = ANY($1)")
            .bind(&plan.drop_affiliations)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE content_items SET organization_id = $1 WHERE id = ANY($2)")
            .bind(plan.survivor_id)
            .bind(&plan.repoint_content)
            .execute(&mut *tx)
            .await?;

        if let Some(name) = &plan.adopt_localized_name {
            sqlx::query(
                "UPDATE organizations SET localized_name = $2 \
                 WHERE id = $1 AND localized_name IS NULL",
            )
            .bind(plan.survivor_id)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }

        // Fails on the foreign key if anything still points at a loser.
        let deleted = sqlx::query("DELETE FROM organizations WHERE id = ANY($1)")
            .bind(&plan.loser_ids)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!("Failed to delete organizations merged into {}", plan.survivor_id)
            })?;
        if deleted.rows_affected() as usize != plan.loser_ids.len() {
            return Err(anyhow!("merge into {}: losing organization missing", plan.survivor_id));
        }

        tx.commit().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RelationRepository
// ---------------------------------------------------------------------------

#[async_trait]
impl RelationRepository for PgStore {
    async fn list_relations(&self) -> Result<Vec<RelationEdge>> {
        let rows = sqlx::query_as::<_, RelationRow>(&format!(
            "SELECT {RELATION_COLUMNS} FROM relations ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RelationEdge::try_from).collect()
    }

    async fn get_relation(&self, id: Uuid) -> Result<Option<RelationEdge>> {
        let row = sqlx::query_as::<_, RelationRow>(&format!(
            "SELECT {RELATION_COLUMNS} FROM relations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RelationEdge::try_from).transpose()
    }

    async fn find_relation(&self, key: &EdgeKey) -> Result<Option<RelationEdge>> {
        let row = sqlx::query_as::<_, RelationRow>(&format!(
            r#"
            SELECT {RELATION_COLUMNS} FROM relations
            WHERE source_id = $1 AND target_id = $2 AND relation_type = $3
            ORDER BY created_at, id
            LIMIT 1
            "#
        ))
        .bind(key.source_id)
        .bind(key.target_id)
        .bind(key.relation.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(RelationEdge::try_from).transpose()
    }

    async fn insert_relation(&self, edge: &RelationEdge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO relations (
                id, source_id, target_id, relation_type, description, provenance, confidence,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(edge.id)
        .bind(edge.source_id)
        .bind(edge.target_id)
        .bind(edge.relation.as_str())
        .bind(&edge.description)
        .bind(&edge.provenance)
        .bind(edge.confidence)
        .bind(edge.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply_changes(&self, changes: &RelationChanges) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(name) = &changes.migration {
            // Primary key makes a second application fail and roll back.
            sqlx::query("INSERT INTO relation_migrations (name) VALUES ($1)")
                .bind(name)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Relation migration {name} already applied"))?;
        }

        let deleted = sqlx::query("DELETE FROM relations WHERE id = ANY($1)")
            .bind(&changes.delete)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() as usize != changes.delete.len() {
            return Err(anyhow!("relation change-set references missing edges"));
        }

        let reversed = sqlx::query(
            "UPDATE relations SET source_id = target_id, target_id = source_id WHERE id = ANY($1)",
        )
        .bind(&changes.reverse)
        .execute(&mut *tx)
        .await?;
        if reversed.rows_affected() as usize != changes.reverse.len() {
            return Err(anyhow!("relation change-set references missing edges"));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn migration_applied(&self, name: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (bool,)>(
            "SELECT EXISTS (SELECT 1 FROM relation_migrations WHERE name = $1)",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

// ---------------------------------------------------------------------------
// ContentRepository
// ---------------------------------------------------------------------------

#[async_trait]
impl ContentRepository for PgStore {
    async fn list_content(&self) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT id, person_id, organization_id, link, summary, first_party, created_at
            FROM content_items
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ContentItem::from).collect())
    }

    async fn add_content(&self, item: &ContentItem) -> Result<()> {
        insert_content(item).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_content(&self, ids: &[Uuid]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM content_items WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(deleted.rows_affected() as usize)
    }
}
