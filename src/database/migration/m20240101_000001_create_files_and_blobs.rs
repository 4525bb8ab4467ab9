//! Initial schema: `files`, `blobs`, and the indexes spec §4.3 requires.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(Blobs::Table)
					.if_not_exists()
					.col(ColumnDef::new(Blobs::Id).string().not_null().primary_key())
					.col(ColumnDef::new(Blobs::Data).binary())
					.col(ColumnDef::new(Blobs::Size).big_integer().not_null())
					.col(ColumnDef::new(Blobs::Checksum).string().not_null())
					.col(ColumnDef::new(Blobs::Tier).string().not_null())
					.col(
						ColumnDef::new(Blobs::RefCount)
							.integer()
							.not_null()
							.check(Expr::col(Blobs::RefCount).gte(0)),
					)
					.col(ColumnDef::new(Blobs::CreatedAtMs).big_integer().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_blobs_tier")
					.table(Blobs::Table)
					.col(Blobs::Tier)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Files::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Files::Id)
							.big_integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Files::Path).string().not_null())
					.col(ColumnDef::new(Files::Name).string().not_null())
					.col(ColumnDef::new(Files::ParentId).big_integer())
					.col(
						ColumnDef::new(Files::Kind)
							.integer()
							.not_null()
							.check(Expr::col(Files::Kind).is_in([0, 1, 2])),
					)
					.col(ColumnDef::new(Files::Mode).integer().not_null())
					.col(ColumnDef::new(Files::Uid).integer().not_null())
					.col(ColumnDef::new(Files::Gid).integer().not_null())
					.col(
						ColumnDef::new(Files::Size)
							.big_integer()
							.not_null()
							.check(Expr::col(Files::Size).gte(0)),
					)
					.col(ColumnDef::new(Files::BlobId).string())
					.col(ColumnDef::new(Files::SymlinkTarget).string())
					.col(ColumnDef::new(Files::Tier).string().not_null())
					.col(ColumnDef::new(Files::AtimeMs).big_integer().not_null())
					.col(ColumnDef::new(Files::MtimeMs).big_integer().not_null())
					.col(ColumnDef::new(Files::CtimeMs).big_integer().not_null())
					.col(ColumnDef::new(Files::BirthMs).big_integer().not_null())
					.col(
						ColumnDef::new(Files::Nlink)
							.integer()
							.not_null()
							.check(Expr::col(Files::Nlink).gte(1)),
					)
					.foreign_key(
						ForeignKey::create()
							.name("fk_files_parent")
							.from(Files::Table, Files::ParentId)
							.to(Files::Table, Files::Id)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_files_path")
					.table(Files::Table)
					.col(Files::Path)
					.unique()
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_files_parent")
					.table(Files::Table)
					.col(Files::ParentId)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_files_tier")
					.table(Files::Table)
					.col(Files::Tier)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(Files::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Blobs::Table).to_owned())
			.await?;
		Ok(())
	}
}

#[derive(DeriveIden)]
enum Files {
	Table,
	Id,
	Path,
	Name,
	ParentId,
	Kind,
	Mode,
	Uid,
	Gid,
	Size,
	BlobId,
	SymlinkTarget,
	Tier,
	AtimeMs,
	MtimeMs,
	CtimeMs,
	BirthMs,
	Nlink,
}

#[derive(DeriveIden)]
enum Blobs {
	Table,
	Id,
	Data,
	Size,
	Checksum,
	Tier,
	RefCount,
	CreatedAtMs,
}
