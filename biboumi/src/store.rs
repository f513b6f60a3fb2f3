//! The remaining SQL-backed persisted state (spec.md §6 "Persisted state"):
//! per-user global options, per-(owner, server) and per-(owner, server,
//! channel) options, after-connection commands, and the accepted-roster
//! table. The archive table itself lives in [`crate::archive`].

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::Result;

/// Creates every table this crate persists to, if not already present.
/// Run once at startup against a fresh or pre-existing database file.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS archive (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            owner TEXT NOT NULL,
            chan TEXT NOT NULL,
            server TEXT NOT NULL,
            date INTEGER NOT NULL,
            nick TEXT NOT NULL,
            body TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS archive_lookup ON archive (owner, chan, server, date)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS global_options (
            owner TEXT PRIMARY KEY,
            max_history_length INTEGER NOT NULL DEFAULT 20,
            record_history INTEGER NOT NULL DEFAULT 1,
            persistent INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS irc_server_options (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            server TEXT NOT NULL,
            pass TEXT,
            ports TEXT,
            tls_ports TEXT,
            username TEXT,
            realname TEXT,
            verify_cert INTEGER NOT NULL DEFAULT 1,
            trusted_fingerprint TEXT,
            sasl_password TEXT,
            nick TEXT,
            encoding_in TEXT,
            encoding_out TEXT,
            max_history_length INTEGER,
            throttle_limit INTEGER,
            UNIQUE(owner, server)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS irc_channel_options (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            server TEXT NOT NULL,
            channel TEXT NOT NULL,
            encoding_in TEXT,
            encoding_out TEXT,
            max_history_length INTEGER,
            persistent INTEGER NOT NULL DEFAULT 0,
            record_history_optional INTEGER,
            UNIQUE(owner, server, channel)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS after_connection_commands (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_fk INTEGER NOT NULL REFERENCES irc_server_options(id),
            command TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS roster (
            local_jid TEXT NOT NULL,
            remote_jid TEXT NOT NULL,
            UNIQUE(local_jid, remote_jid)
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Opens (creating if absent) the SQLite database at `path` and runs
/// migrations.
pub async fn open(path: &std::path::Path) -> Result<SqlitePool> {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = SqlitePoolOptions::new().connect(&url).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Per-user global defaults (spec.md §6 `global_options`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GlobalOptions {
    pub owner: String,
    pub max_history_length: i64,
    pub record_history: bool,
    pub persistent: bool,
}

impl GlobalOptions {
    pub fn defaults(owner: &str, persistent_by_default: bool) -> GlobalOptions {
        GlobalOptions {
            owner: owner.to_owned(),
            max_history_length: 20,
            record_history: true,
            persistent: persistent_by_default,
        }
    }

    pub async fn load(pool: &SqlitePool, owner: &str, persistent_by_default: bool) -> Result<GlobalOptions> {
        let row: Option<GlobalOptions> = sqlx::query_as(
            "SELECT owner, max_history_length, record_history, persistent FROM global_options WHERE owner = ?",
        )
        .bind(owner)
        .fetch_optional(pool)
        .await?;
        Ok(row.unwrap_or_else(|| GlobalOptions::defaults(owner, persistent_by_default)))
    }
}

/// Per-(owner, server) connection options (spec.md §6 `irc_server_options`).
#[derive(Debug, Clone, Default)]
pub struct IrcServerOptions {
    pub pass: Option<String>,
    pub ports: Option<String>,
    pub tls_ports: Option<String>,
    pub username: Option<String>,
    pub realname: Option<String>,
    pub verify_cert: bool,
    pub trusted_fingerprint: Option<String>,
    pub sasl_password: Option<String>,
    pub nick: Option<String>,
    pub encoding_in: Option<String>,
    pub encoding_out: Option<String>,
    pub max_history_length: Option<i64>,
    pub throttle_limit: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct IrcServerOptionsRow {
    pass: Option<String>,
    ports: Option<String>,
    tls_ports: Option<String>,
    username: Option<String>,
    realname: Option<String>,
    verify_cert: bool,
    trusted_fingerprint: Option<String>,
    sasl_password: Option<String>,
    nick: Option<String>,
    encoding_in: Option<String>,
    encoding_out: Option<String>,
    max_history_length: Option<i64>,
    throttle_limit: Option<i64>,
}

impl From<IrcServerOptionsRow> for IrcServerOptions {
    fn from(row: IrcServerOptionsRow) -> Self {
        IrcServerOptions {
            pass: row.pass,
            ports: row.ports,
            tls_ports: row.tls_ports,
            username: row.username,
            realname: row.realname,
            verify_cert: row.verify_cert,
            trusted_fingerprint: row.trusted_fingerprint,
            sasl_password: row.sasl_password,
            nick: row.nick,
            encoding_in: row.encoding_in,
            encoding_out: row.encoding_out,
            max_history_length: row.max_history_length,
            throttle_limit: row.throttle_limit,
        }
    }
}

impl IrcServerOptions {
    pub async fn load(pool: &SqlitePool, owner: &str, server: &str) -> Result<Option<IrcServerOptions>> {
        let row: Option<IrcServerOptionsRow> = sqlx::query_as(
            "SELECT pass, ports, tls_ports, username, realname, verify_cert, trusted_fingerprint, \
             sasl_password, nick, encoding_in, encoding_out, max_history_length, throttle_limit \
             FROM irc_server_options WHERE owner = ? AND server = ?",
        )
        .bind(owner)
        .bind(server)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Upserts the full row, used by the `configure-irc-server` ad-hoc
    /// command (SPEC_FULL.md "Supplemented features — Ad-hoc commands").
    pub async fn save(pool: &SqlitePool, owner: &str, server: &str, options: &IrcServerOptions) -> Result<()> {
        sqlx::query(
            "INSERT INTO irc_server_options \
             (owner, server, pass, ports, tls_ports, username, realname, verify_cert, \
              trusted_fingerprint, sasl_password, nick, encoding_in, encoding_out, \
              max_history_length, throttle_limit) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(owner, server) DO UPDATE SET \
               pass = excluded.pass, ports = excluded.ports, tls_ports = excluded.tls_ports, \
               username = excluded.username, realname = excluded.realname, \
               verify_cert = excluded.verify_cert, trusted_fingerprint = excluded.trusted_fingerprint, \
               sasl_password = excluded.sasl_password, nick = excluded.nick, \
               encoding_in = excluded.encoding_in, encoding_out = excluded.encoding_out, \
               max_history_length = excluded.max_history_length, throttle_limit = excluded.throttle_limit",
        )
        .bind(owner)
        .bind(server)
        .bind(&options.pass)
        .bind(&options.ports)
        .bind(&options.tls_ports)
        .bind(&options.username)
        .bind(&options.realname)
        .bind(options.verify_cert)
        .bind(&options.trusted_fingerprint)
        .bind(&options.sasl_password)
        .bind(&options.nick)
        .bind(&options.encoding_in)
        .bind(&options.encoding_out)
        .bind(options.max_history_length)
        .bind(options.throttle_limit)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// The raw lines to send after registration (spec.md SPEC_FULL.md
    /// "after-connection commands").
    pub async fn after_connection_commands(pool: &SqlitePool, owner: &str, server: &str) -> Result<Vec<String>> {
        let server_row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM irc_server_options WHERE owner = ? AND server = ?")
                .bind(owner)
                .bind(server)
                .fetch_optional(pool)
                .await?;
        let Some((id,)) = server_row else {
            return Ok(Vec::new());
        };
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT command FROM after_connection_commands WHERE server_fk = ? ORDER BY id")
                .bind(id)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }
}

/// Per-(owner, server, channel) options (spec.md §6 `irc_channel_options`).
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct IrcChannelOptions {
    pub encoding_in: Option<String>,
    pub encoding_out: Option<String>,
    pub max_history_length: Option<i64>,
    pub persistent: bool,
    /// Tri-state: `None` = unset, falls back to [`GlobalOptions::record_history`]
    /// (spec.md §9 Open Question (c), resolved in DESIGN.md).
    pub record_history_optional: Option<bool>,
}

impl IrcChannelOptions {
    pub async fn load(
        pool: &SqlitePool,
        owner: &str,
        server: &str,
        channel: &str,
    ) -> Result<Option<IrcChannelOptions>> {
        let row: Option<IrcChannelOptions> = sqlx::query_as(
            "SELECT encoding_in, encoding_out, max_history_length, persistent, record_history_optional \
             FROM irc_channel_options WHERE owner = ? AND server = ? AND channel = ?",
        )
        .bind(owner)
        .bind(server)
        .bind(channel)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Every persistent channel for every owner, used to rejoin on
    /// startup (SPEC_FULL.md "Persistent channels").
    pub async fn all_persistent(pool: &SqlitePool) -> Result<Vec<(String, String, String)>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT owner, server, channel FROM irc_channel_options WHERE persistent = 1")
                .fetch_all(pool)
                .await?;
        Ok(rows)
    }

    /// Upserts the full row, used by the `configure-irc-channel` ad-hoc
    /// command (SPEC_FULL.md "Supplemented features — Ad-hoc commands").
    pub async fn save(pool: &SqlitePool, owner: &str, server: &str, channel: &str, options: &IrcChannelOptions) -> Result<()> {
        sqlx::query(
            "INSERT INTO irc_channel_options \
             (owner, server, channel, encoding_in, encoding_out, max_history_length, persistent, record_history_optional) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(owner, server, channel) DO UPDATE SET \
               encoding_in = excluded.encoding_in, encoding_out = excluded.encoding_out, \
               max_history_length = excluded.max_history_length, persistent = excluded.persistent, \
               record_history_optional = excluded.record_history_optional",
        )
        .bind(owner)
        .bind(server)
        .bind(channel)
        .bind(&options.encoding_in)
        .bind(&options.encoding_out)
        .bind(options.max_history_length)
        .bind(options.persistent)
        .bind(options.record_history_optional)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_persistent(pool: &SqlitePool, owner: &str, server: &str, channel: &str, persistent: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO irc_channel_options (owner, server, channel, persistent) VALUES (?, ?, ?, ?) \
             ON CONFLICT(owner, server, channel) DO UPDATE SET persistent = excluded.persistent",
        )
        .bind(owner)
        .bind(server)
        .bind(channel)
        .bind(persistent)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Resolves the tri-state against the owner's global default
    /// (spec.md §9 Open Question (c)).
    pub fn resolve_record_history(&self, global: bool) -> bool {
        self.record_history_optional.unwrap_or(global)
    }
}

/// Records that `local_jid` accepted a subscription from `remote_jid`
/// (spec.md §6 `roster`).
pub async fn remember_roster_entry(pool: &SqlitePool, local_jid: &str, remote_jid: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO roster (local_jid, remote_jid) VALUES (?, ?)")
        .bind(local_jid)
        .bind(remote_jid)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn has_roster_entry(pool: &SqlitePool, local_jid: &str, remote_jid: &str) -> Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM roster WHERE local_jid = ? AND remote_jid = ?")
            .bind(local_jid)
            .bind(remote_jid)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}
