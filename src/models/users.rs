#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub image_url: Option<String>,
}
