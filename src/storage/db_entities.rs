//! SeaORM entity models used by the database buffer backend.
//!
//! - `buffered_messages`: one row per captured message awaiting delivery,
//!   ordered by the auto-increment id.

/// Buffered messages table entity model.
pub mod buffered_messages {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "buffered_messages")]
    pub struct Model {
        /// Auto-increment row id; gives the FIFO order
        #[sea_orm(primary_key)]
        pub id: i32,
        /// Originating address
        pub sender: String,
        /// Full (concatenated) message text
        #[sea_orm(column_type = "Text")]
        pub body: String,
        /// RFC3339 capture timestamp
        pub captured_at: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
