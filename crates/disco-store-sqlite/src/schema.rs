//! SQL schema for the disco SQLite store.
//!
//! Executed once at connection startup. Ownership is expressed with foreign
//! keys: deleting a rule cascades to everything it owns, deleting a prototype
//! only detaches its entities.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS rules (
    rule_id        TEXT PRIMARY KEY,
    host_id        TEXT NOT NULL,
    name           TEXT NOT NULL,
    rule_key       TEXT NOT NULL,
    item_type      TEXT NOT NULL,
    delay          TEXT NOT NULL,
    lifetime       TEXT NOT NULL,   -- '30d', '0', 'never', ...
    cascade_policy TEXT NOT NULL,   -- 'remove' | 'retain' | 'restrict'
    created_at     TEXT NOT NULL,
    UNIQUE (host_id, rule_key)
);

CREATE TABLE IF NOT EXISTS templates (
    template_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prototypes (
    prototype_id TEXT PRIMARY KEY,
    rule_id      TEXT NOT NULL REFERENCES rules(rule_id) ON DELETE CASCADE,
    kind         TEXT NOT NULL,   -- 'item' | 'host' | 'trigger' | 'graph'
    spec_json    TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

-- Mirrors the template list in a host prototype's spec_json so that a
-- template cannot be deleted while a prototype still references it.
CREATE TABLE IF NOT EXISTS prototype_templates (
    prototype_id TEXT NOT NULL REFERENCES prototypes(prototype_id) ON DELETE CASCADE,
    template_id  TEXT NOT NULL REFERENCES templates(template_id),
    PRIMARY KEY (prototype_id, template_id)
);

CREATE TABLE IF NOT EXISTS entities (
    entity_id    TEXT PRIMARY KEY,
    rule_id      TEXT NOT NULL REFERENCES rules(rule_id) ON DELETE CASCADE,
    prototype_id TEXT REFERENCES prototypes(prototype_id) ON DELETE SET NULL,
    kind         TEXT NOT NULL,
    identity     TEXT NOT NULL,
    identity_key TEXT NOT NULL,   -- identity normalised per kind
    spec_json    TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    last_seen    TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'active',
    UNIQUE (rule_id, prototype_id, identity_key)
);

CREATE TABLE IF NOT EXISTS template_links (
    entity_id   TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    template_id TEXT NOT NULL REFERENCES templates(template_id) ON DELETE CASCADE,
    link_type   TEXT NOT NULL,   -- 'manual' | 'prototype'
    linked_at   TEXT NOT NULL,
    PRIMARY KEY (entity_id, template_id)
);

CREATE TABLE IF NOT EXISTS history (
    history_id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id  TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    clock      TEXT NOT NULL,
    value      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS prototypes_rule_idx     ON prototypes(rule_id);
CREATE INDEX IF NOT EXISTS entities_rule_idx       ON entities(rule_id, status);
CREATE INDEX IF NOT EXISTS entities_prototype_idx  ON entities(prototype_id);
CREATE INDEX IF NOT EXISTS entities_identity_idx   ON entities(identity_key);
CREATE INDEX IF NOT EXISTS history_entity_idx      ON history(entity_id, clock);
CREATE INDEX IF NOT EXISTS proto_templates_tpl_idx ON prototype_templates(template_id);

PRAGMA user_version = 1;
";
