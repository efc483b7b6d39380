//! One implementation per reading app for each concern that more than one
//! app supports.
//!
//! The reconcilers iterate the implementations enabled in the session's
//! flags and never branch on the app themselves.

mod coolreader;
mod koreader;
mod native;

pub use self::coolreader::CoolReaderBackend;
pub use self::koreader::KoReaderBackend;
pub(crate) use self::koreader::{collection_index, doc_settings, save_collection_index, save_doc_settings};
pub use self::native::NativeBackend;
use crate::annotations::Annotation;
use crate::error::Result;
use crate::position::{DevicePosition, Position};
use crate::resolve::ResolvedBook;
use crate::session::{Backend, Feature, SessionContext};
use async_trait::async_trait;

/// Named collections of books.
#[async_trait]
pub trait CollectionBackend: Send + Sync {
    fn backend(&self) -> Backend;

    /// Names of the collections the book is an active member of, or `None`
    /// when this backend has no record of the book.
    async fn active(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Option<Vec<String>>>;

    /// Make the book a member of exactly `names`. Returns the number of
    /// writes made.
    async fn send(&self, ctx: &SessionContext, book: &ResolvedBook, names: &[String], ts: i64) -> Result<usize>;
}

/// The current reading position.
#[async_trait]
pub trait PositionBackend: Send + Sync {
    fn backend(&self) -> Backend;

    async fn read(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Option<DevicePosition>>;

    /// Store a position. Returns whether anything was written.
    async fn write(&self, ctx: &SessionContext, book: &ResolvedBook, position: &Position) -> Result<bool>;
}

/// Highlights and notes.
#[async_trait]
pub trait AnnotationSource: Send + Sync {
    fn backend(&self) -> Backend;

    async fn extract(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Vec<Annotation>>;
}

pub fn collection_backends(ctx: &SessionContext) -> Vec<Box<dyn CollectionBackend>> {
    let mut backends: Vec<Box<dyn CollectionBackend>> = Vec::new();
    for backend in ctx.flags.backends(Feature::Collections) {
        match backend {
            Backend::Native => backends.push(Box::new(NativeBackend)),
            Backend::KoReader => backends.push(Box::new(KoReaderBackend)),
            Backend::CoolReader => {},
        }
    }
    backends
}

pub fn position_backends(ctx: &SessionContext) -> Vec<Box<dyn PositionBackend>> {
    ctx.flags
        .backends(Feature::Position)
        .into_iter()
        .map(|backend| -> Box<dyn PositionBackend> {
            match backend {
                Backend::Native => Box::new(NativeBackend),
                Backend::KoReader => Box::new(KoReaderBackend),
                Backend::CoolReader => Box::new(CoolReaderBackend),
            }
        })
        .collect()
}

pub fn annotation_sources(ctx: &SessionContext) -> Vec<Box<dyn AnnotationSource>> {
    ctx.flags
        .backends(Feature::Annotations)
        .into_iter()
        .map(|backend| -> Box<dyn AnnotationSource> {
            match backend {
                Backend::Native => Box::new(NativeBackend),
                Backend::KoReader => Box::new(KoReaderBackend),
                Backend::CoolReader => Box::new(CoolReaderBackend),
            }
        })
        .collect()
}

/// `<coarse> * K + <fine>`, saturating on absurd inputs.
pub(crate) fn sort_key(coarse: i64, fine: i64) -> i64 {
    coarse.saturating_mul(crate::consts::SORT_KEY_MULTIPLIER).saturating_add(fine)
}
