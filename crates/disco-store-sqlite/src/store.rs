//! [`SqliteStore`] — the SQLite implementation of [`DiscoveryStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use disco_core::{
  entity::{
    CreateOutcome, DiscoveredEntity, EntityStatus, HistoryValue, LinkChanges,
    LinkType, NewEntity, Template, TemplateDeletion, TemplateLink,
  },
  prototype::{EntitySpec, NewPrototype, Prototype},
  rule::{DiscoveryRule, NewRule, RulePatch},
  store::{DiscoveryStore, EntityQuery},
};

use crate::{
  Error, Result,
  encode::{
    ENTITY_COLUMNS, LINK_COLUMNS, PROTOTYPE_COLUMNS, RULE_COLUMNS,
    TEMPLATE_COLUMNS, RawEntity, RawHistory, RawLink, RawPrototype, RawRule,
    RawTemplate, decode_kind, decode_uuid, encode_dt, encode_enum, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A discovery store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Outcome of a checked write performed inside one transaction.
enum Checked<T> {
  Done(T),
  NotFound,
  MissingRule,
  MissingTemplate(String),
  KindMismatch(String),
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Return the first template id in `templates` that does not exist.
fn missing_template(
  conn: &rusqlite::Connection,
  templates: &[String],
) -> rusqlite::Result<Option<String>> {
  for template_id in templates {
    let exists = conn
      .query_row(
        "SELECT 1 FROM templates WHERE template_id = ?1",
        [template_id],
        |_| Ok(()),
      )
      .optional()?
      .is_some();
    if !exists {
      return Ok(Some(template_id.clone()));
    }
  }
  Ok(None)
}

fn replace_prototype_templates(
  conn: &rusqlite::Connection,
  prototype_id: &str,
  templates: &[String],
) -> rusqlite::Result<()> {
  conn.execute(
    "DELETE FROM prototype_templates WHERE prototype_id = ?1",
    [prototype_id],
  )?;
  for template_id in templates {
    conn.execute(
      "INSERT OR IGNORE INTO prototype_templates (prototype_id, template_id)
       VALUES (?1, ?2)",
      [prototype_id, template_id.as_str()],
    )?;
  }
  Ok(())
}

fn select_entity(
  conn: &rusqlite::Connection,
  entity_id: &str,
) -> rusqlite::Result<Option<RawEntity>> {
  conn
    .query_row(
      &format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.entity_id = ?1"),
      [entity_id],
      RawEntity::from_row,
    )
    .optional()
}

fn encode_templates(spec: &EntitySpec) -> Vec<String> {
  spec.templates().iter().copied().map(encode_uuid).collect()
}

// ─── DiscoveryStore impl ─────────────────────────────────────────────────────

impl DiscoveryStore for SqliteStore {
  type Error = Error;

  // ── Rules ─────────────────────────────────────────────────────────────────

  async fn create_rule(&self, input: NewRule) -> Result<DiscoveryRule> {
    let rule = DiscoveryRule {
      rule_id:    Uuid::new_v4(),
      host_id:    input.host_id,
      name:       input.name,
      key:        input.key,
      item_type:  input.item_type,
      delay:      input.delay,
      lifetime:   input.lifetime,
      cascade:    input.cascade,
      created_at: Utc::now(),
    };

    let id_str        = encode_uuid(rule.rule_id);
    let host_str      = encode_uuid(rule.host_id);
    let name          = rule.name.clone();
    let key           = rule.key.clone();
    let item_type_str = encode_enum(&rule.item_type)?;
    let delay         = rule.delay.clone();
    let lifetime_str  = rule.lifetime.to_string();
    let cascade_str   = encode_enum(&rule.cascade)?;
    let at_str        = encode_dt(rule.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO rules (
             rule_id, host_id, name, rule_key, item_type,
             delay, lifetime, cascade_policy, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str,
            host_str,
            name,
            key,
            item_type_str,
            delay,
            lifetime_str,
            cascade_str,
            at_str,
          ],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::DuplicateRuleKey {
        host_id: rule.host_id,
        key:     rule.key,
      });
    }
    Ok(rule)
  }

  async fn get_rule(&self, rule_id: Uuid) -> Result<Option<DiscoveryRule>> {
    let id_str = encode_uuid(rule_id);

    let raw: Option<RawRule> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {RULE_COLUMNS} FROM rules WHERE rule_id = ?1"),
              [id_str],
              RawRule::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRule::into_rule).transpose()
  }

  async fn find_rule(&self, host_id: Uuid, key: String) -> Result<Option<DiscoveryRule>> {
    let host_str = encode_uuid(host_id);

    let raw: Option<RawRule> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {RULE_COLUMNS} FROM rules WHERE host_id = ?1 AND rule_key = ?2"
              ),
              [host_str, key],
              RawRule::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRule::into_rule).transpose()
  }

  async fn list_rules(&self, host_id: Option<Uuid>) -> Result<Vec<DiscoveryRule>> {
    let host_str = host_id.map(encode_uuid);

    let raws: Vec<RawRule> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RULE_COLUMNS} FROM rules
           WHERE (?1 IS NULL OR host_id = ?1)
           ORDER BY created_at, rule_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![host_str], RawRule::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRule::into_rule).collect()
  }

  async fn update_rule(
    &self,
    rule_id: Uuid,
    patch:   RulePatch,
  ) -> Result<Option<DiscoveryRule>> {
    let id_str       = encode_uuid(rule_id);
    let lifetime_str = patch.lifetime.map(|l| l.to_string());
    let cascade_str  = patch.cascade.map(|c| encode_enum(&c)).transpose()?;
    let name         = patch.name;
    let delay        = patch.delay;

    let raw: Option<RawRule> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE rules SET
             name           = COALESCE(?2, name),
             delay          = COALESCE(?3, delay),
             lifetime       = COALESCE(?4, lifetime),
             cascade_policy = COALESCE(?5, cascade_policy)
           WHERE rule_id = ?1",
          rusqlite::params![id_str, name, delay, lifetime_str, cascade_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = tx.query_row(
          &format!("SELECT {RULE_COLUMNS} FROM rules WHERE rule_id = ?1"),
          [&id_str],
          RawRule::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw.map(RawRule::into_rule).transpose()
  }

  async fn delete_rule(&self, rule_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(rule_id);
    let deleted = self
      .conn
      .call(move |conn| Ok(conn.execute("DELETE FROM rules WHERE rule_id = ?1", [id_str])?))
      .await?;
    Ok(deleted > 0)
  }

  // ── Templates ─────────────────────────────────────────────────────────────

  async fn create_template(&self, name: String) -> Result<Template> {
    let template = Template {
      template_id: Uuid::new_v4(),
      name,
      created_at:  Utc::now(),
    };

    let id_str = encode_uuid(template.template_id);
    let name   = template.name.clone();
    let at_str = encode_dt(template.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO templates (template_id, name, created_at)
           VALUES (?1, ?2, ?3)",
          [id_str, name, at_str],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::DuplicateTemplateName(template.name));
    }
    Ok(template)
  }

  async fn get_template(&self, template_id: Uuid) -> Result<Option<Template>> {
    let id_str = encode_uuid(template_id);

    let raw: Option<RawTemplate> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE template_id = ?1"),
              [id_str],
              RawTemplate::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTemplate::into_template).transpose()
  }

  async fn list_templates(&self) -> Result<Vec<Template>> {
    let raws: Vec<RawTemplate> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {TEMPLATE_COLUMNS} FROM templates ORDER BY name"))?;
        let rows = stmt
          .query_map([], RawTemplate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTemplate::into_template).collect()
  }

  async fn delete_template(&self, template_id: Uuid) -> Result<TemplateDeletion> {
    let id_str = encode_uuid(template_id);
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let referenced: i64 = tx.query_row(
          "SELECT COUNT(*) FROM prototype_templates WHERE template_id = ?1",
          [&id_str],
          |r| r.get(0),
        )?;
        if referenced > 0 {
          return Ok(TemplateDeletion::InUse(referenced as usize));
        }
        let deleted = tx.execute("DELETE FROM templates WHERE template_id = ?1", [&id_str])?;
        tx.commit()?;
        Ok(if deleted > 0 { TemplateDeletion::Deleted } else { TemplateDeletion::NotFound })
      })
      .await?;
    Ok(outcome)
  }

  // ── Prototypes ────────────────────────────────────────────────────────────

  async fn create_prototype(&self, input: NewPrototype) -> Result<Prototype> {
    let prototype = Prototype {
      prototype_id: Uuid::new_v4(),
      rule_id:      input.rule_id,
      spec:         input.spec,
      created_at:   Utc::now(),
    };

    let id_str    = encode_uuid(prototype.prototype_id);
    let rule_str  = encode_uuid(prototype.rule_id);
    let kind_str  = prototype.kind().as_str();
    let spec_json = prototype.spec.to_json()?;
    let at_str    = encode_dt(prototype.created_at);
    let templates = encode_templates(&prototype.spec);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let rule_exists = tx
          .query_row("SELECT 1 FROM rules WHERE rule_id = ?1", [&rule_str], |_| Ok(()))
          .optional()?
          .is_some();
        if !rule_exists {
          return Ok(Checked::MissingRule);
        }
        if let Some(missing) = missing_template(&tx, &templates)? {
          return Ok(Checked::MissingTemplate(missing));
        }
        tx.execute(
          "INSERT INTO prototypes (prototype_id, rule_id, kind, spec_json, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, rule_str, kind_str, spec_json, at_str],
        )?;
        replace_prototype_templates(&tx, &id_str, &templates)?;
        tx.commit()?;
        Ok(Checked::Done(()))
      })
      .await?;

    match outcome {
      Checked::Done(()) => Ok(prototype),
      Checked::MissingTemplate(id) => Err(Error::TemplateNotFound(decode_uuid(&id)?)),
      _ => Err(Error::RuleNotFound(prototype.rule_id)),
    }
  }

  async fn get_prototype(&self, prototype_id: Uuid) -> Result<Option<Prototype>> {
    let id_str = encode_uuid(prototype_id);

    let raw: Option<RawPrototype> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROTOTYPE_COLUMNS} FROM prototypes WHERE prototype_id = ?1"),
              [id_str],
              RawPrototype::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPrototype::into_prototype).transpose()
  }

  async fn list_prototypes(&self, rule_id: Uuid) -> Result<Vec<Prototype>> {
    let rule_str = encode_uuid(rule_id);

    let raws: Vec<RawPrototype> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PROTOTYPE_COLUMNS} FROM prototypes
           WHERE rule_id = ?1
           ORDER BY created_at, prototype_id"
        ))?;
        let rows = stmt
          .query_map([rule_str], RawPrototype::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPrototype::into_prototype).collect()
  }

  async fn update_prototype(
    &self,
    prototype_id: Uuid,
    spec:         EntitySpec,
  ) -> Result<Option<Prototype>> {
    let id_str    = encode_uuid(prototype_id);
    let kind_str  = spec.kind().as_str();
    let spec_json = spec.to_json()?;
    let templates = encode_templates(&spec);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current_kind: Option<String> = tx
          .query_row(
            "SELECT kind FROM prototypes WHERE prototype_id = ?1",
            [&id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(current_kind) = current_kind else {
          return Ok(Checked::NotFound);
        };
        if current_kind != kind_str {
          return Ok(Checked::KindMismatch(current_kind));
        }
        if let Some(missing) = missing_template(&tx, &templates)? {
          return Ok(Checked::MissingTemplate(missing));
        }
        tx.execute(
          "UPDATE prototypes SET spec_json = ?2 WHERE prototype_id = ?1",
          [&id_str, &spec_json],
        )?;
        replace_prototype_templates(&tx, &id_str, &templates)?;
        let raw = tx.query_row(
          &format!("SELECT {PROTOTYPE_COLUMNS} FROM prototypes WHERE prototype_id = ?1"),
          [&id_str],
          RawPrototype::from_row,
        )?;
        tx.commit()?;
        Ok(Checked::Done(raw))
      })
      .await?;

    match outcome {
      Checked::Done(raw) => Ok(Some(raw.into_prototype()?)),
      Checked::NotFound => Ok(None),
      Checked::MissingTemplate(id) => Err(Error::TemplateNotFound(decode_uuid(&id)?)),
      Checked::KindMismatch(current) => Err(Error::Core(disco_core::Error::KindMismatch {
        expected: decode_kind(&current)?.as_str(),
        actual:   kind_str,
      })),
      Checked::MissingRule => Ok(None),
    }
  }

  async fn delete_prototype(&self, prototype_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(prototype_id);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM prototypes WHERE prototype_id = ?1", [id_str])?)
      })
      .await?;
    Ok(deleted > 0)
  }

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn create_entity(&self, input: NewEntity) -> Result<CreateOutcome> {
    let now = Utc::now();
    let entity = DiscoveredEntity {
      entity_id:    Uuid::new_v4(),
      rule_id:      input.rule_id,
      prototype_id: Some(input.prototype_id),
      identity:     input.spec.identity().to_owned(),
      spec:         input.spec,
      created_at:   now,
      last_seen:    input.last_seen,
      status:       EntityStatus::Active,
    };

    let id_str        = encode_uuid(entity.entity_id);
    let rule_str      = encode_uuid(entity.rule_id);
    let proto_str     = encode_uuid(input.prototype_id);
    let kind_str      = entity.kind().as_str();
    let identity      = entity.identity.clone();
    let identity_key  = entity.identity_key();
    let spec_json     = entity.spec.to_json()?;
    let created_str   = encode_dt(entity.created_at);
    let last_seen_str = encode_dt(entity.last_seen);
    let status_str    = entity.status.as_str();
    let link_type     = LinkType::Prototype.as_str();
    let links: Vec<String> =
      input.template_links.iter().copied().map(encode_uuid).collect();

    let existing: Option<RawEntity> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let inserted = tx.execute(
          "INSERT OR IGNORE INTO entities (
             entity_id, rule_id, prototype_id, kind, identity, identity_key,
             spec_json, created_at, last_seen, status
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str,
            rule_str,
            proto_str,
            kind_str,
            identity,
            identity_key,
            spec_json,
            created_str,
            last_seen_str,
            status_str,
          ],
        )?;

        if inserted == 0 {
          let raw = tx.query_row(
            &format!(
              "SELECT {ENTITY_COLUMNS} FROM entities e
               WHERE e.rule_id = ?1 AND e.prototype_id = ?2 AND e.identity_key = ?3"
            ),
            [&rule_str, &proto_str, &identity_key],
            RawEntity::from_row,
          )?;
          return Ok(Some(raw));
        }

        for template_id in &links {
          tx.execute(
            "INSERT OR REPLACE INTO template_links (entity_id, template_id, link_type, linked_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id_str, template_id, link_type, created_str],
          )?;
        }
        tx.commit()?;
        Ok(None)
      })
      .await?;

    match existing {
      Some(raw) => Ok(CreateOutcome::Existing(raw.into_entity()?)),
      None => Ok(CreateOutcome::Created(entity)),
    }
  }

  async fn get_entity(&self, entity_id: Uuid) -> Result<Option<DiscoveredEntity>> {
    let id_str = encode_uuid(entity_id);

    let raw: Option<RawEntity> = self
      .conn
      .call(move |conn| Ok(select_entity(conn, &id_str)?))
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn list_entities(&self, query: EntityQuery) -> Result<Vec<DiscoveredEntity>> {
    let rule_str   = query.rule_id.map(encode_uuid);
    let host_str   = query.host_id.map(encode_uuid);
    let proto_str  = query.prototype_id.map(encode_uuid);
    let kind_str   = query.kind.map(|k| k.as_str());
    let status_str = query.status.map(|s| s.as_str());
    let identity   = query.identity.map(|i| match query.kind {
      Some(kind) => kind.identity_key(&i),
      None => i,
    });
    let limit_val  = query.limit.map(|l| l as i64).unwrap_or(-1);
    let offset_val = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTITY_COLUMNS}
           FROM entities e
           JOIN rules r ON r.rule_id = e.rule_id
           WHERE (?1 IS NULL OR e.rule_id = ?1)
             AND (?2 IS NULL OR r.host_id = ?2)
             AND (?3 IS NULL OR e.prototype_id = ?3)
             AND (?4 IS NULL OR e.kind = ?4)
             AND (?5 IS NULL OR e.status = ?5)
             AND (?6 IS NULL OR e.identity_key = ?6 OR e.identity = ?6)
           ORDER BY e.identity, e.entity_id
           LIMIT ?7 OFFSET ?8"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              rule_str,
              host_str,
              proto_str,
              kind_str,
              status_str,
              identity,
              limit_val,
              offset_val,
            ],
            RawEntity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn refresh_entity(
    &self,
    entity_id: Uuid,
    spec:      EntitySpec,
    last_seen: DateTime<Utc>,
  ) -> Result<Option<DiscoveredEntity>> {
    let id_str        = encode_uuid(entity_id);
    let identity      = spec.identity().to_owned();
    let identity_key  = spec.identity_key();
    let spec_json     = spec.to_json()?;
    let last_seen_str = encode_dt(last_seen);
    let status_str    = EntityStatus::Active.as_str();

    let raw: Option<RawEntity> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE entities SET
             identity     = ?2,
             identity_key = ?3,
             spec_json    = ?4,
             last_seen    = ?5,
             status       = ?6
           WHERE entity_id = ?1",
          rusqlite::params![id_str, identity, identity_key, spec_json, last_seen_str, status_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = select_entity(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn mark_lost(&self, entity_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(entity_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE entities SET status = 'lost' WHERE entity_id = ?1 AND status = 'active'",
          [id_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn orphan_entities(&self, prototype_id: Uuid) -> Result<usize> {
    let id_str = encode_uuid(prototype_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE entities SET prototype_id = NULL WHERE prototype_id = ?1",
          [id_str],
        )?)
      })
      .await?;
    Ok(changed)
  }

  async fn delete_entity(&self, entity_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(entity_id);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM entities WHERE entity_id = ?1", [id_str])?)
      })
      .await?;
    Ok(deleted > 0)
  }

  // ── Template links ────────────────────────────────────────────────────────

  async fn list_links(&self, entity_id: Uuid) -> Result<Vec<TemplateLink>> {
    let id_str = encode_uuid(entity_id);

    let raws: Vec<RawLink> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LINK_COLUMNS} FROM template_links
           WHERE entity_id = ?1
           ORDER BY linked_at, template_id"
        ))?;
        let rows = stmt
          .query_map([id_str], RawLink::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLink::into_link).collect()
  }

  async fn apply_link_changes(&self, entity_id: Uuid, changes: LinkChanges) -> Result<()> {
    if changes.is_empty() {
      return Ok(());
    }

    let id_str = encode_uuid(entity_id);
    let at_str = encode_dt(Utc::now());
    let upsert: Vec<(String, &'static str)> = changes
      .upsert
      .iter()
      .map(|&(template_id, link_type)| (encode_uuid(template_id), link_type.as_str()))
      .collect();
    let remove: Vec<String> = changes.remove.iter().copied().map(encode_uuid).collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (template_id, link_type) in &upsert {
          tx.execute(
            "INSERT INTO template_links (entity_id, template_id, link_type, linked_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (entity_id, template_id) DO UPDATE SET link_type = excluded.link_type",
            rusqlite::params![id_str, template_id, link_type, at_str],
          )?;
        }
        for template_id in &remove {
          tx.execute(
            "DELETE FROM template_links WHERE entity_id = ?1 AND template_id = ?2",
            [&id_str, template_id],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── History ───────────────────────────────────────────────────────────────

  async fn record_value(
    &self,
    entity_id: Uuid,
    value:     String,
    clock:     DateTime<Utc>,
  ) -> Result<HistoryValue> {
    let id_str    = encode_uuid(entity_id);
    let clock_str = encode_dt(clock);
    let stored    = value.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO history (entity_id, clock, value) VALUES (?1, ?2, ?3)",
          [id_str, clock_str, stored],
        )?;
        Ok(())
      })
      .await?;

    Ok(HistoryValue { entity_id, clock, value })
  }

  async fn history(&self, entity_id: Uuid, limit: Option<usize>) -> Result<Vec<HistoryValue>> {
    let id_str    = encode_uuid(entity_id);
    let limit_val = limit.map(|l| l as i64).unwrap_or(-1);

    let raws: Vec<RawHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entity_id, clock, value FROM history
           WHERE entity_id = ?1
           ORDER BY clock DESC, history_id DESC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, limit_val], |row| {
            Ok(RawHistory {
              entity_id: row.get(0)?,
              clock:     row.get(1)?,
              value:     row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistory::into_value).collect()
  }
}
