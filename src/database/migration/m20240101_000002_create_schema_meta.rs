//! `schema_meta`: the single-row table `Database::check_schema_version`
//! reads on startup (spec §4.3).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(SchemaMeta::Table)
					.if_not_exists()
					.col(ColumnDef::new(SchemaMeta::Id).integer().not_null().primary_key())
					.col(ColumnDef::new(SchemaMeta::Version).integer().not_null())
					.to_owned(),
			)
			.await
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(SchemaMeta::Table).to_owned())
			.await
	}
}

#[derive(DeriveIden)]
enum SchemaMeta {
	Table,
	Id,
	Version,
}
