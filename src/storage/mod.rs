pub mod append;
pub mod database;
pub mod latest;
pub mod persistence;
pub mod session;
pub mod store;
pub mod table;

pub use append::AppendOnlyStore;
pub use database::CacheDatabase;
pub use latest::LatestStateStore;
pub use persistence::{DatabaseSnapshot, SnapshotFile};
pub use session::Session;
pub use store::{CacheStore, RowPage, StorageStrategy};
pub use table::CacheTable;

/// Open a store handle of the given strategy on a shared database.
pub fn open_store<E>(strategy: StorageStrategy, db: CacheDatabase<E>) -> Box<dyn CacheStore<E>>
where
    E: Clone + Send + Sync + 'static,
{
    match strategy {
        StorageStrategy::AppendOnly => Box::new(AppendOnlyStore::new(db)),
        StorageStrategy::LatestState => Box::new(LatestStateStore::new(db)),
    }
}
