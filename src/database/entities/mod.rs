//! Sea-ORM entity definitions for the Metadata Store (spec §3, §4.3).

pub mod blob;
pub mod inode;
pub mod schema_meta;

pub use blob::Entity as BlobEntity;
pub use inode::Entity as InodeEntity;
pub use schema_meta::Entity as SchemaMetaEntity;
