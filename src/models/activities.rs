#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub activity_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub scheduled_at: String,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// Activity id plus the username on its host attendance, if any.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HostLookupRow {
    pub activity_id: String,
    pub host_username: Option<String>,
}
