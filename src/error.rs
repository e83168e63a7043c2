use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to read {table} table: {source}")]
    Io {
        table: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{table} table CSV error: {source}")]
    Csv {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{table} table is missing required column `{column}`")]
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("{table} table row {row}: `{column}` value {value:?} is not a boolean")]
    InvalidBoolean {
        table: &'static str,
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("{table} table did not contain any data rows")]
    EmptyTable { table: &'static str },

    #[error(
        "policy_trigger disagrees across segment rows ({disagreeing} of {total} differ from row 0)"
    )]
    InconsistentPolicyTrigger { disagreeing: usize, total: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
