//! SQL schema for the Pulso SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS leads (
    lead_id           TEXT PRIMARY KEY,
    crm_id            TEXT NOT NULL UNIQUE,
    first_name        TEXT NOT NULL,
    last_name         TEXT,
    email             TEXT,
    phone             TEXT NOT NULL,
    stage             TEXT NOT NULL,   -- LeadStage discriminant
    classification    TEXT NOT NULL,   -- hot | warm | cold
    source            TEXT NOT NULL,
    tags              TEXT NOT NULL DEFAULT '[]',
    custom_fields     TEXT NOT NULL DEFAULT '{}',
    notes             TEXT,
    assigned_agent_id TEXT,
    is_active         INTEGER NOT NULL DEFAULT 1,
    created_at        TEXT NOT NULL,   -- ISO 8601 UTC throughout
    updated_at        TEXT NOT NULL,
    last_contacted_at TEXT,
    qualified_at      TEXT
);

CREATE TABLE IF NOT EXISTS messages (
    message_id     TEXT PRIMARY KEY,
    crm_message_id TEXT NOT NULL UNIQUE,
    lead_id        TEXT NOT NULL REFERENCES leads(lead_id),
    content        TEXT NOT NULL,
    channel        TEXT NOT NULL,
    direction      TEXT NOT NULL,   -- inbound | outbound
    status         TEXT NOT NULL,
    external_id    TEXT,
    error_message  TEXT,
    sent_at        TEXT,
    delivered_at   TEXT,
    read_at        TEXT,
    failed_at      TEXT,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS calls (
    call_id            TEXT PRIMARY KEY,
    provider_call_id   TEXT UNIQUE,
    lead_id            TEXT NOT NULL REFERENCES leads(lead_id),
    direction          TEXT NOT NULL,
    status             TEXT NOT NULL,
    outcome            TEXT,
    from_number        TEXT NOT NULL,
    to_number          TEXT NOT NULL,
    duration_seconds   INTEGER NOT NULL DEFAULT 0,
    recording_url      TEXT,
    transcript         TEXT,
    transcript_summary TEXT,
    sentiment          TEXT,
    intent             TEXT,
    function_calls     TEXT NOT NULL DEFAULT '[]',
    error_message      TEXT,
    queued_at          TEXT NOT NULL,
    initiated_at       TEXT,
    answered_at        TEXT,
    completed_at       TEXT,
    failed_at          TEXT
);

CREATE TABLE IF NOT EXISTS appointments (
    appointment_id      TEXT PRIMARY KEY,
    scheduling_id       TEXT UNIQUE,
    lead_id             TEXT NOT NULL REFERENCES leads(lead_id),
    scheduled_date      TEXT NOT NULL,
    duration_minutes    INTEGER NOT NULL DEFAULT 30,
    appointment_type    TEXT NOT NULL,
    status              TEXT NOT NULL,
    professional_id     TEXT NOT NULL,
    professional_name   TEXT,
    clinic_id           TEXT NOT NULL,
    clinic_name         TEXT,
    reminder_sent_24h   INTEGER NOT NULL DEFAULT 0,
    reminder_sent_3h    INTEGER NOT NULL DEFAULT 0,
    confirmation_sent   INTEGER NOT NULL DEFAULT 0,
    notes               TEXT,
    cancellation_reason TEXT,
    confirmed_at        TEXT,
    reminded_at         TEXT,
    completed_at        TEXT,
    no_show_at          TEXT,
    cancelled_at        TEXT,
    created_at          TEXT NOT NULL
);

-- The event log is append-mostly: rows are inserted by ingestion and
-- updated only for processing bookkeeping. The core never deletes.
CREATE TABLE IF NOT EXISTS events (
    event_id         TEXT PRIMARY KEY,
    event_type       TEXT NOT NULL,
    status           TEXT NOT NULL,
    source           TEXT NOT NULL,
    payload          TEXT NOT NULL,
    metadata         TEXT NOT NULL DEFAULT '{}',
    lead_id          TEXT,            -- loose references, no FK
    appointment_id   TEXT,
    call_id          TEXT,
    message_id       TEXT,
    correlation_id   TEXT NOT NULL,
    triggers_actions TEXT NOT NULL DEFAULT '[]',
    idempotency_key  TEXT UNIQUE,     -- at-most-once guard for deliveries
    occurred_at      TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    processed_at     TEXT,
    failed_at        TEXT,
    retry_count      INTEGER NOT NULL DEFAULT 0,
    error_message    TEXT
);

CREATE INDEX IF NOT EXISTS leads_phone_idx          ON leads(phone);
CREATE INDEX IF NOT EXISTS leads_stage_idx          ON leads(stage);
CREATE INDEX IF NOT EXISTS messages_lead_idx        ON messages(lead_id);
CREATE INDEX IF NOT EXISTS calls_lead_idx           ON calls(lead_id);
CREATE INDEX IF NOT EXISTS appointments_lead_idx    ON appointments(lead_id);
CREATE INDEX IF NOT EXISTS appointments_status_idx  ON appointments(status, scheduled_date);
CREATE INDEX IF NOT EXISTS events_type_status_idx   ON events(event_type, status);
CREATE INDEX IF NOT EXISTS events_lead_occurred_idx ON events(lead_id, occurred_at);
CREATE INDEX IF NOT EXISTS events_correlation_idx   ON events(correlation_id, occurred_at);

PRAGMA user_version = 1;
";
