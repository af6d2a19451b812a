// Attendee as seen by one caller: `is_following` depends on who is asking.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendeeRow {
    pub username: String,
    pub display_name: String,
    pub image_url: Option<String>,
    pub is_host: i64,
    pub is_following: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendanceRow {
    pub activity_id: String,
    pub user_id: String,
    pub is_host: i64,
    pub joined_at: String,
}
