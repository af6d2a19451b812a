use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub comment_id: String,
    pub activity_id: String,
    pub body: String,
    pub created_at: String,
    pub username: String,
    pub display_name: String,
    pub image_url: Option<String>,
}
