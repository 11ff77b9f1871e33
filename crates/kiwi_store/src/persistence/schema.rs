//! Relational layout of the store.

/// Version written to the `metadata` table.
pub const SCHEMA_VERSION: &str = "1";

/// Creates all tables and indexes. Safe to run on an existing database.
pub const CREATE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id         INTEGER PRIMARY KEY,
    ntype      TEXT    NOT NULL,
    svalue     TEXT    NOT NULL,
    ivalue     INTEGER,
    dvalue     REAL,
    tvalue     TEXT,
    tzoffset   INTEGER,
    bvalue     INTEGER,
    ltype      INTEGER,
    lang       TEXT,
    created_at TEXT    NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_resource
    ON nodes(ntype, svalue) WHERE ntype IN ('uri', 'bnode');
CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_literal
    ON nodes(svalue, IFNULL(ltype, -1), IFNULL(lang, ''))
    WHERE ntype NOT IN ('uri', 'bnode');

CREATE TABLE IF NOT EXISTS triples (
    id         INTEGER PRIMARY KEY,
    subject    INTEGER NOT NULL,
    predicate  INTEGER NOT NULL,
    object     INTEGER NOT NULL,
    context    INTEGER NOT NULL,
    creator    INTEGER,
    inferred   INTEGER NOT NULL DEFAULT 0,
    deleted    INTEGER NOT NULL DEFAULT 0,
    created_at TEXT    NOT NULL,
    deleted_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_triples_spoc
    ON triples(subject, predicate, object, context) WHERE deleted = 0;
CREATE INDEX IF NOT EXISTS idx_triples_p ON triples(predicate, deleted);
CREATE INDEX IF NOT EXISTS idx_triples_o ON triples(object, deleted);
CREATE INDEX IF NOT EXISTS idx_triples_c ON triples(context, deleted);

CREATE TABLE IF NOT EXISTS namespaces (
    id         INTEGER PRIMARY KEY,
    prefix     TEXT NOT NULL UNIQUE,
    uri        TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sequences (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS metadata (
    mkey   TEXT PRIMARY KEY,
    mvalue TEXT NOT NULL
);
";

pub const NODE_COLUMNS: &str =
    "id, ntype, svalue, ivalue, dvalue, tvalue, tzoffset, bvalue, ltype, lang, created_at";

pub const TRIPLE_COLUMNS: &str =
    "id, subject, predicate, object, context, creator, inferred, deleted, created_at, deleted_at";
