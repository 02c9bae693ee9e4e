//! Database schema constants.
//!
//! All statements are idempotent so the migration runner can apply them to
//! a database that already has part of the schema.

/// Shared training queue. QA tasks and the chunk entries they produce live
/// in the same table, distinguished by `mode`.
pub const CREATE_DATASET_TRAININGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS dataset_trainings (
    id UUID PRIMARY KEY,
    team_id VARCHAR(64) NOT NULL,
    tmb_id VARCHAR(64) NOT NULL,
    dataset_id VARCHAR(64) NOT NULL,
    collection_id VARCHAR(64) NOT NULL,
    mode VARCHAR(16) NOT NULL,
    q TEXT NOT NULL,
    a TEXT NOT NULL DEFAULT '',
    indexes JSONB NOT NULL DEFAULT '[]'::jsonb,
    prompt TEXT,
    model VARCHAR(255),
    bill_id VARCHAR(64),
    lock_time TIMESTAMPTZ NOT NULL DEFAULT 'epoch',
    lease_state VARCHAR(32) NOT NULL DEFAULT 'active',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Remaining balance per team, in the billing unit of the host application.
pub const CREATE_TEAM_BALANCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS team_balances (
    team_id VARCHAR(64) PRIMARY KEY,
    balance BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_TRAINING_BILLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS training_bills (
    id SERIAL PRIMARY KEY,
    team_id VARCHAR(64) NOT NULL,
    tmb_id VARCHAR(64) NOT NULL,
    bill_id VARCHAR(64),
    model VARCHAR(255) NOT NULL,
    total_tokens INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_INFORMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS informs (
    id SERIAL PRIMARY KEY,
    tmb_id VARCHAR(64) NOT NULL,
    kind VARCHAR(32) NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    read BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Serves the claim query: eligible rows ordered by `lock_time`.
pub const CREATE_CLAIM_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_dataset_trainings_claim
    ON dataset_trainings(mode, lease_state, lock_time)
"#;

pub const CREATE_TEAM_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_dataset_trainings_team_id ON dataset_trainings(team_id)
"#;

pub const CREATE_BILLS_TEAM_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_training_bills_team_id ON training_bills(team_id)
"#;

/// Returns all schema creation statements in the correct order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_DATASET_TRAININGS_TABLE,
        CREATE_TEAM_BALANCES_TABLE,
        CREATE_TRAINING_BILLS_TABLE,
        CREATE_INFORMS_TABLE,
        CREATE_CLAIM_INDEX,
        CREATE_TEAM_INDEX,
        CREATE_BILLS_TEAM_INDEX,
    ]
}
