use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Environment {
    Test,
    Demo,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &str {
        match self {
            Environment::Test => "test",
            Environment::Demo => "demo",
            Environment::Prod => "prod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Which side of the invoice the tenant is queried as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SubjectType {
    /// Invoices issued by the tenant (seller side).
    #[default]
    #[value(name = "subject1")]
    Subject1,
    /// Invoices received by the tenant (buyer side).
    #[value(name = "subject2")]
    Subject2,
}

impl SubjectType {
    pub fn as_str(&self) -> &str {
        match self {
            SubjectType::Subject1 => "subject1",
            SubjectType::Subject2 => "subject2",
        }
    }
}

/// How a tenant's date range is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One window covering the configured look-back.
    #[default]
    #[serde(alias = "C", alias = "c")]
    Daily,
    /// Chunked backward walk over the full history, resumable via checkpoint.
    Backfill,
}
