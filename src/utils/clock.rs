use chrono::{DateTime, Utc};

/// Represents an entity responsible for providing dates across application. Ids and creation
/// times are derived from it, so tests can pin them.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;
}

pub struct DefaultClock;

impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
