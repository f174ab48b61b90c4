pub mod blobs;
pub mod gc;
pub mod manifests;
pub mod sessions;
pub mod types;

use crate::db::Db;

/// The registry's single storage facade. All of C2-C5 from the component
/// design hang off this one type because they all share one database --
/// there is no pluggable backend to abstract over the way a trait-based
/// `RepositoryStore`/`BlobStore`/`ManifestStore` split would support
/// swapping in a different backend. Operations are grouped into `blobs`,
/// `manifests`, `sessions`, `gc` submodules that each add an `impl Store`
/// block, one concern per file, without trait indirection this system
/// has no second implementation to justify.
#[derive(Clone)]
pub struct Store {
    db: Db,
}

impl Store {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}
