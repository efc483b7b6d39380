//! Read and favorite flags, ratings and reviews.
//!
//! Flags compare by equality only: sending makes the device match the
//! catalog, loading makes the catalog match the device. Ratings and reviews
//! live in the reader app's per-book sidecar, never created for them.

use crate::backend::{collection_index, doc_settings, save_collection_index, save_doc_settings};
use crate::catalog::FieldValue;
use crate::error::{ErrorKind, Result};
use crate::resolve::ResolvedBook;
use crate::run::Batch;
use crate::session::{Backend, Feature};
use exn::ResultExt;
use shelfsync_explorer::Settings;
use shelfsync_sidecar::{FAVORITES, MAX_RATING};
use tracing::instrument;

/// A boolean flag the device database keeps per book and profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Read,
    Favorite,
}
impl Flag {
    fn feature(self) -> Feature {
        match self {
            Self::Read => Feature::Read,
            Self::Favorite => Feature::Favorite,
        }
    }

    /// The flag as stored on the device. A column never written is `None`.
    fn stored(self, settings: &Settings) -> Option<bool> {
        match self {
            Self::Read => settings.completed,
            Self::Favorite => settings.favorite,
        }
    }
}

/// Catalog stars (0 to 10) to app stars (0 to 5). Odd and out of range
/// values cannot be represented.
pub fn to_app_rating(catalog: i64) -> Option<i64> {
    ((0..=MAX_RATING * 2).contains(&catalog) && catalog % 2 == 0).then_some(catalog / 2)
}

pub fn to_catalog_rating(app: i64) -> Option<i64> {
    (0..=MAX_RATING).contains(&app).then_some(app * 2)
}

#[instrument(level = "debug", skip_all, fields(book = book.id, ?flag))]
pub(crate) async fn send_flag(batch: &mut Batch<'_>, book: &ResolvedBook, flag: Flag, column: &str) -> Result<()> {
    let value = batch.catalog.field(book.id, column).and_then(|v| v.as_bool()).unwrap_or(false);
    let ctx = batch.ctx;

    if ctx.flags.is_enabled(flag.feature(), Backend::Native)
        && let Some(native) = book.native
    {
        let settings = ctx.repo.settings(native, ctx.profile).await.or_raise(|| ErrorKind::Explorer)?;
        let current = settings.and_then(|s| flag.stored(&s));
        if current != Some(value) {
            match flag {
                Flag::Read => ctx.repo.upsert_completed(native, ctx.profile, value, ctx.now).await,
                Flag::Favorite => ctx.repo.upsert_favorite(native, ctx.profile, value, ctx.now).await,
            }
            .or_raise(|| ErrorKind::Explorer)?;
            tracing::info!(book = book.id, ?flag, value, "Wrote flag to device");
            batch.report.device_writes += 1;
        }
    }

    if ctx.flags.is_enabled(flag.feature(), Backend::KoReader) {
        let changed = match flag {
            Flag::Read => {
                let Some((path, mut settings)) = doc_settings(ctx, book).await? else {
                    return Ok(());
                };
                let changed = settings.set_complete(value);
                if changed {
                    save_doc_settings(&path, &settings).await?;
                }
                changed
            },
            Flag::Favorite => {
                let (path, mut index) = collection_index(ctx).await?;
                let changed = match value {
                    true => index.add(FAVORITES, &book.device_path),
                    false => index.remove(FAVORITES, &book.device_path),
                };
                if changed {
                    save_collection_index(&path, &index).await?;
                }
                changed
            },
        };
        if changed {
            batch.report.device_writes += 1;
        }
    }
    Ok(())
}

#[instrument(level = "debug", skip_all, fields(book = book.id, ?flag))]
pub(crate) async fn load_flag(batch: &mut Batch<'_>, book: &ResolvedBook, flag: Flag, column: &str) -> Result<()> {
    let catalog = batch.catalog.field(book.id, column).and_then(|v| v.as_bool());
    let ctx = batch.ctx;

    if flag == Flag::Favorite && ctx.flags.prefer_app_favorites {
        let (_, index) = collection_index(ctx).await?;
        let device = index.contains(FAVORITES, &book.device_path);
        if catalog.unwrap_or(false) != device {
            batch.changes.push(book.id, column, Some(FieldValue::Bool(device)));
        }
        return Ok(());
    }

    let Some(native) = book.native else {
        return Ok(());
    };
    let settings = ctx.repo.settings(native, ctx.profile).await.or_raise(|| ErrorKind::Explorer)?;
    match settings.and_then(|s| flag.stored(&s)) {
        // Nothing recorded for this flag: only a set flag is stale.
        None if catalog == Some(true) => batch.changes.push(book.id, column, None),
        None => {},
        Some(device) => {
            if catalog.unwrap_or(false) != device {
                batch.changes.push(book.id, column, Some(FieldValue::Bool(device)));
            }
        },
    }
    Ok(())
}

#[instrument(level = "debug", skip_all, fields(book = book.id))]
pub(crate) async fn send_rating(batch: &mut Batch<'_>, book: &ResolvedBook, column: &str) -> Result<()> {
    let Some(catalog) = batch.catalog.field(book.id, column).and_then(|v| v.as_rating()) else {
        return Ok(());
    };
    let Some(rating) = to_app_rating(catalog) else {
        tracing::warn!(book = book.id, rating = catalog, "Rating cannot be represented in the app, skipped");
        batch.report.skipped += 1;
        return Ok(());
    };
    let Some((path, mut settings)) = doc_settings(batch.ctx, book).await? else {
        return Ok(());
    };
    let rating = (rating > 0).then_some(rating);
    if settings.summary.rating != rating {
        settings.summary.rating = rating;
        save_doc_settings(&path, &settings).await?;
        batch.report.device_writes += 1;
    }
    Ok(())
}

#[instrument(level = "debug", skip_all, fields(book = book.id))]
pub(crate) async fn load_rating(batch: &mut Batch<'_>, book: &ResolvedBook, column: &str) -> Result<()> {
    let Some((_, settings)) = doc_settings(batch.ctx, book).await? else {
        return Ok(());
    };
    let Some(app) = settings.summary.rating else {
        return Ok(());
    };
    let Some(rating) = to_catalog_rating(app) else {
        tracing::warn!(book = book.id, rating = app, "App rating out of range, skipped");
        batch.report.skipped += 1;
        return Ok(());
    };
    let catalog = batch.catalog.field(book.id, column).and_then(|v| v.as_rating());
    if catalog != Some(rating) {
        batch.changes.push(book.id, column, Some(FieldValue::Rating(rating)));
    }
    Ok(())
}

#[instrument(level = "debug", skip_all, fields(book = book.id))]
pub(crate) async fn send_review(batch: &mut Batch<'_>, book: &ResolvedBook, column: &str) -> Result<()> {
    let Some(review) = batch.catalog.field(book.id, column).and_then(|v| v.as_text().map(str::to_string)) else {
        return Ok(());
    };
    let Some((path, mut settings)) = doc_settings(batch.ctx, book).await? else {
        return Ok(());
    };
    if settings.summary.note.as_deref() != Some(review.as_str()) {
        settings.summary.note = Some(review);
        save_doc_settings(&path, &settings).await?;
        batch.report.device_writes += 1;
    }
    Ok(())
}

#[instrument(level = "debug", skip_all, fields(book = book.id))]
pub(crate) async fn load_review(batch: &mut Batch<'_>, book: &ResolvedBook, column: &str) -> Result<()> {
    let Some((_, settings)) = doc_settings(batch.ctx, book).await? else {
        return Ok(());
    };
    let Some(review) = settings.summary.note.filter(|n| !n.trim().is_empty()) else {
        return Ok(());
    };
    let catalog = batch.catalog.field(book.id, column);
    if catalog.as_ref().and_then(FieldValue::as_text) != Some(review.as_str()) {
        batch.changes.push(book.id, column, Some(FieldValue::Text(review)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, Some(0))]
    #[case(8, Some(4))]
    #[case(10, Some(5))]
    #[case(7, None)]
    #[case(12, None)]
    #[case(-2, None)]
    fn test_to_app_rating(#[case] catalog: i64, #[case] expected: Option<i64>) {
        assert_eq!(to_app_rating(catalog), expected);
    }

    #[rstest]
    #[case(4, Some(8))]
    #[case(5, Some(10))]
    #[case(6, None)]
    fn test_to_catalog_rating(#[case] app: i64, #[case] expected: Option<i64>) {
        assert_eq!(to_catalog_rating(app), expected);
    }
}
