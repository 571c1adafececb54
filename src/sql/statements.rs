//! Per-table SQL, prepared once at store construction.

/// Statements for a follower's event-log table, named `{follower}_events`.
#[derive(Clone, Debug)]
pub struct EventStatements {
    table_name: String,
    select_in_range: String,
    insert: String,
}

impl EventStatements {
    pub fn new(follower_name: &str) -> Self {
        let table_name = format!("{follower_name}_events");

        Self {
            select_in_range: format!(
                "SELECT id, key, payload, occurred_ms, version FROM {table_name} \
                 WHERE key = $1 AND version > $2 AND version <= $3 ORDER BY version ASC"
            ),
            insert: format!(
                "INSERT INTO {table_name} (id, key, payload, occurred_ms, version) \
                 VALUES ($1, $2, $3, $4, $5)"
            ),
            table_name,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn select_in_range(&self) -> &str {
        &self.select_in_range
    }

    pub fn insert(&self) -> &str {
        &self.insert
    }

    pub fn create_table(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {0} \
             (id uuid PRIMARY KEY NOT NULL, \
              key TEXT NOT NULL, \
              payload jsonb NOT NULL, \
              occurred_ms BIGINT NOT NULL, \
              version BIGINT NOT NULL)",
            self.table_name
        )
    }

    pub fn create_unique_index(&self) -> String {
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {0}_key_version ON {0} (key, version)",
            self.table_name
        )
    }
}

/// Statements for a follower's snapshot table, named `{follower}_snapshots`.
#[derive(Clone, Debug)]
pub struct StateStatements {
    table_name: String,
    select_by_key: String,
    insert: String,
    update: String,
    delete_by_key: String,
}

impl StateStatements {
    pub fn new(follower_name: &str) -> Self {
        let table_name = format!("{follower_name}_snapshots");

        Self {
            select_by_key: format!(
                "SELECT key, payload, version, doing_version FROM {table_name} WHERE key = $1"
            ),
            insert: format!(
                "INSERT INTO {table_name} (key, payload, version, doing_version) \
                 VALUES ($1, $2, $3, $4)"
            ),
            update: format!(
                "UPDATE {table_name} SET payload = $2, version = $3, doing_version = $4 \
                 WHERE key = $1"
            ),
            delete_by_key: format!("DELETE FROM {table_name} WHERE key = $1"),
            table_name,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn select_by_key(&self) -> &str {
        &self.select_by_key
    }

    pub fn insert(&self) -> &str {
        &self.insert
    }

    pub fn update(&self) -> &str {
        &self.update
    }

    pub fn delete_by_key(&self) -> &str {
        &self.delete_by_key
    }

    pub fn create_table(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {0} \
             (key TEXT PRIMARY KEY NOT NULL, \
              payload jsonb NOT NULL, \
              version BIGINT NOT NULL, \
              doing_version BIGINT NOT NULL)",
            self.table_name
        )
    }
}

/// Statements for the transactional commit log.
#[derive(Clone, Debug)]
pub struct CommitStatements {
    table_name: String,
    insert: String,
    delete: String,
    select_by_unit: String,
    update_status: String,
}

impl CommitStatements {
    pub fn new(table_name: &str) -> Self {
        Self {
            insert: format!(
                "INSERT INTO {table_name} (unit_name, transaction_id, data, status) \
                 VALUES ($1, $2, $3, $4)"
            ),
            delete: format!("DELETE FROM {table_name} WHERE unit_name = $1 AND transaction_id = $2"),
            select_by_unit: format!(
                "SELECT unit_name, transaction_id, data, status FROM {table_name} \
                 WHERE unit_name = $1 ORDER BY transaction_id ASC"
            ),
            update_status: format!(
                "UPDATE {table_name} SET status = $3 WHERE unit_name = $1 AND transaction_id = $2"
            ),
            table_name: table_name.to_owned(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn insert(&self) -> &str {
        &self.insert
    }

    pub fn delete(&self) -> &str {
        &self.delete
    }

    pub fn select_by_unit(&self) -> &str {
        &self.select_by_unit
    }

    pub fn update_status(&self) -> &str {
        &self.update_status
    }

    pub fn create_table(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {0} \
             (unit_name TEXT NOT NULL, \
              transaction_id BIGINT NOT NULL, \
              data TEXT NOT NULL, \
              status INT NOT NULL)",
            self.table_name
        )
    }

    pub fn create_unique_index(&self) -> String {
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {0}_unit_transaction \
             ON {0} (unit_name, transaction_id)",
            self.table_name
        )
    }
}
