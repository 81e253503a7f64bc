pub(crate) mod error;
pub(crate) mod queries;

pub use error::RepositoryError;
pub use migrations::Migrator;
pub use queries::SeaOrmStore;

/// Database migrations module
pub mod migrations {
    use sea_orm_migration::prelude::*;

    /// Main migrator struct for database migrations
    pub struct Migrator;

    #[async_trait::async_trait]
    impl MigratorTrait for Migrator {
        fn migrations() -> Vec<Box<dyn MigrationTrait>> {
            vec![Box::new(tables::Migration)]
        }
    }

    /// Database tables module containing table creation migrations
    pub mod tables {
        use super::*;

        /// Migration struct for creating database tables
        #[derive(DeriveMigrationName)]
        pub struct Migration;

        #[async_trait::async_trait]
        impl MigrationTrait for Migration {
            /// Creates the necessary database tables if they don't exist
            async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
                // Waitlist entries keyed by normalized email. Every column besides
                // the email has a default or is nullable so the minimal insert works.
                manager
                    .create_table(
                        Table::create()
                            .table(Waitlist::Table)
                            .if_not_exists()
                            .col(
                                ColumnDef::new(Waitlist::Email)
                                    .string()
                                    .not_null()
                                    .primary_key(),
                            )
                            .col(
                                ColumnDef::new(Waitlist::Status)
                                    .string()
                                    .not_null()
                                    .default("pending"),
                            )
                            .col(ColumnDef::new(Waitlist::ConfirmationToken).string().null())
                            .col(
                                ColumnDef::new(Waitlist::ConfirmationSentAt)
                                    .timestamp_with_time_zone()
                                    .null(),
                            )
                            .col(ColumnDef::new(Waitlist::ConsumedToken).string().null())
                            .col(ColumnDef::new(Waitlist::Zone).string().null())
                            .col(ColumnDef::new(Waitlist::Name).string().null())
                            .col(ColumnDef::new(Waitlist::UserAgent).text().null())
                            .col(ColumnDef::new(Waitlist::Ip).string().null())
                            .col(
                                ColumnDef::new(Waitlist::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null()
                                    .default(Expr::current_timestamp()),
                            )
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name("idx_waitlist_confirmation_token")
                            .table(Waitlist::Table)
                            .col(Waitlist::ConfirmationToken)
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name("idx_waitlist_consumed_token")
                            .table(Waitlist::Table)
                            .col(Waitlist::ConsumedToken)
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_table(
                        Table::create()
                            .table(PushSubscriptions::Table)
                            .if_not_exists()
                            .col(
                                ColumnDef::new(PushSubscriptions::Endpoint)
                                    .text()
                                    .not_null()
                                    .primary_key(),
                            )
                            .col(ColumnDef::new(PushSubscriptions::UserId).string().not_null())
                            .col(ColumnDef::new(PushSubscriptions::P256dh).string().not_null())
                            .col(ColumnDef::new(PushSubscriptions::Auth).string().not_null())
                            .col(
                                ColumnDef::new(PushSubscriptions::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null()
                                    .default(Expr::current_timestamp()),
                            )
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name("idx_push_subscriptions_user_id")
                            .table(PushSubscriptions::Table)
                            .col(PushSubscriptions::UserId)
                            .to_owned(),
                    )
                    .await?;

                Ok(())
            }

            /// Drops the database tables
            async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
                manager
                    .drop_table(Table::drop().table(PushSubscriptions::Table).to_owned())
                    .await?;
                manager
                    .drop_table(Table::drop().table(Waitlist::Table).to_owned())
                    .await?;
                Ok(())
            }
        }

        #[derive(Iden)]
        enum Waitlist {
            Table,
            Email,
            Status,
            ConfirmationToken,
            ConfirmationSentAt,
            ConsumedToken,
            Zone,
            Name,
            UserAgent,
            Ip,
            CreatedAt,
        }

        #[derive(Iden)]
        enum PushSubscriptions {
            Table,
            Endpoint,
            UserId,
            #[iden = "p256dh"]
            P256dh,
            Auth,
            CreatedAt,
        }
    }
}
