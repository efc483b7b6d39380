//! One pass over the catalog.

use crate::annotations::{self, Renderer};
use crate::backend::{annotation_sources, position_backends};
use crate::catalog::{Catalog, FieldValue};
use crate::changes::{PendingChanges, SyncOutcome, SyncReport};
use crate::collections;
use crate::error::{ErrorKind, Result};
use crate::position::{PositionAction, PositionField, decide};
use crate::resolve::{ResolvedBook, resolve};
use crate::session::{Feature, SessionContext};
use crate::status::{self, Flag};
use exn::ResultExt;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use tracing::instrument;

/// What a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Collections, read, favorite, rating and review, catalog to device.
    SendAll,
    SendCollections,
    SendRead,
    SendFavorite,
    SendRatings,
    SendReviews,
    /// Collections, read, favorite, rating and review, device to catalog.
    LoadAll,
    LoadCollections,
    LoadRead,
    LoadFavorite,
    LoadRatings,
    LoadReviews,
    /// Newest reading position wins, per app.
    SyncPositions,
    /// Catalog positions overwrite the device.
    ForcePositions,
    ExtractAnnotations,
    /// Fill in authors the device database is missing.
    RepairAuthors,
}
impl Command {
    pub const ALL: [Command; 16] = [
        Command::SendAll,
        Command::SendCollections,
        Command::SendRead,
        Command::SendFavorite,
        Command::SendRatings,
        Command::SendReviews,
        Command::LoadAll,
        Command::LoadCollections,
        Command::LoadRead,
        Command::LoadFavorite,
        Command::LoadRatings,
        Command::LoadReviews,
        Command::SyncPositions,
        Command::ForcePositions,
        Command::ExtractAnnotations,
        Command::RepairAuthors,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SendAll => "send-all",
            Self::SendCollections => "send-collections",
            Self::SendRead => "send-read",
            Self::SendFavorite => "send-favorite",
            Self::SendRatings => "send-ratings",
            Self::SendReviews => "send-reviews",
            Self::LoadAll => "load-all",
            Self::LoadCollections => "load-collections",
            Self::LoadRead => "load-read",
            Self::LoadFavorite => "load-favorite",
            Self::LoadRatings => "load-ratings",
            Self::LoadReviews => "load-reviews",
            Self::SyncPositions => "sync-positions",
            Self::ForcePositions => "force-positions",
            Self::ExtractAnnotations => "extract-annotations",
            Self::RepairAuthors => "repair-authors",
        }
    }

    /// Features a send or load command covers.
    fn features(self) -> &'static [Feature] {
        const ALL: &[Feature] = &[Feature::Collections, Feature::Read, Feature::Favorite, Feature::Rating, Feature::Review];
        match self {
            Self::SendAll | Self::LoadAll => ALL,
            Self::SendCollections | Self::LoadCollections => &[Feature::Collections],
            Self::SendRead | Self::LoadRead => &[Feature::Read],
            Self::SendFavorite | Self::LoadFavorite => &[Feature::Favorite],
            Self::SendRatings | Self::LoadRatings => &[Feature::Rating],
            Self::SendReviews | Self::LoadReviews => &[Feature::Review],
            Self::SyncPositions | Self::ForcePositions => &[Feature::Position],
            Self::ExtractAnnotations => &[Feature::Annotations],
            Self::RepairAuthors => &[],
        }
    }
}
impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}
impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|c| c.name() == s).ok_or_else(|| format!("unknown command `{s}`"))
    }
}

/// Mutable state of one run.
pub(crate) struct Batch<'a> {
    pub(crate) ctx: &'a SessionContext,
    pub(crate) catalog: &'a dyn Catalog,
    pub(crate) changes: PendingChanges,
    pub(crate) report: SyncReport,
}

/// Run a command over every catalog book.
///
/// Device writes happen as the run goes; catalog changes are returned for
/// the caller to apply once the run is over.
#[instrument(skip(ctx, catalog))]
pub async fn run(ctx: &SessionContext, catalog: &dyn Catalog, command: Command) -> Result<SyncOutcome> {
    let mut batch = Batch { ctx, catalog, changes: PendingChanges::default(), report: SyncReport::default() };
    if command == Command::RepairAuthors {
        repair_authors(&mut batch).await?;
    } else {
        let renderer = Renderer::new()?;
        for id in catalog.book_ids() {
            batch.report.books_seen += 1;
            let Some(book) = resolve(ctx, id).await? else {
                continue;
            };
            batch.report.books_on_device += 1;
            run_book(&mut batch, &book, command, &renderer).await?;
        }
    }
    batch.report.catalog_changes = batch.changes.len();
    tracing::info!(%command, report = %batch.report, "Run finished");
    Ok(SyncOutcome { changes: batch.changes, report: batch.report })
}

#[instrument(level = "debug", skip_all, fields(book = book.id))]
async fn run_book(batch: &mut Batch<'_>, book: &ResolvedBook, command: Command, renderer: &Renderer) -> Result<()> {
    let ctx = batch.ctx;
    let flags = &ctx.flags;
    for &feature in command.features() {
        let Some(column) = flags.column(feature) else {
            continue;
        };
        if flags.backends(feature).is_empty() {
            continue;
        }
        match (command, feature) {
            (Command::SyncPositions, _) => sync_positions(batch, book, column, false).await?,
            (Command::ForcePositions, _) => sync_positions(batch, book, column, true).await?,
            (Command::ExtractAnnotations, _) => extract_annotations(batch, book, column, renderer).await?,
            (command, feature) => {
                let send = matches!(
                    command,
                    Command::SendAll
                        | Command::SendCollections
                        | Command::SendRead
                        | Command::SendFavorite
                        | Command::SendRatings
                        | Command::SendReviews
                );
                match (feature, send) {
                    (Feature::Collections, true) => collections::send(batch, book, column).await?,
                    (Feature::Collections, false) => collections::load(batch, book, column).await?,
                    (Feature::Read, true) => status::send_flag(batch, book, Flag::Read, column).await?,
                    (Feature::Read, false) => status::load_flag(batch, book, Flag::Read, column).await?,
                    (Feature::Favorite, true) => status::send_flag(batch, book, Flag::Favorite, column).await?,
                    (Feature::Favorite, false) => status::load_flag(batch, book, Flag::Favorite, column).await?,
                    (Feature::Rating, true) => status::send_rating(batch, book, column).await?,
                    (Feature::Rating, false) => status::load_rating(batch, book, column).await?,
                    (Feature::Review, true) => status::send_review(batch, book, column).await?,
                    (Feature::Review, false) => status::load_review(batch, book, column).await?,
                    _ => {},
                }
            },
        }
    }
    Ok(())
}

/// Reconcile each app's position with the catalog's. With `force`, every
/// catalog position is written to its app regardless.
#[instrument(level = "debug", skip_all, fields(book = book.id, force))]
async fn sync_positions(batch: &mut Batch<'_>, book: &ResolvedBook, column: &str, force: bool) -> Result<()> {
    let text = batch.catalog.field(book.id, column);
    let mut field = PositionField::parse(text.as_ref().and_then(FieldValue::as_text).unwrap_or_default());
    let mut adopted = false;
    for backend in position_backends(batch.ctx) {
        let tag = backend.backend();
        let action = match (force, field.get(tag)) {
            (true, Some(catalog)) => PositionAction::Push(catalog.clone()),
            (true, None) => PositionAction::Keep,
            (false, catalog) => {
                let device = backend.read(batch.ctx, book).await?;
                decide(catalog, device.as_ref())
            },
        };
        match action {
            PositionAction::Keep => {},
            PositionAction::Push(position) => {
                if backend.write(batch.ctx, book, &position).await? {
                    batch.report.device_writes += 1;
                }
            },
            PositionAction::Adopt(position) => {
                tracing::debug!(book = book.id, backend = %tag, token = %position.token, "Adopting device position");
                field.set(tag, Some(position));
                adopted = true;
            },
        }
    }
    if adopted {
        batch.changes.push(book.id, column, field.render().map(FieldValue::Text));
    }
    Ok(())
}

#[instrument(level = "debug", skip_all, fields(book = book.id))]
async fn extract_annotations(batch: &mut Batch<'_>, book: &ResolvedBook, column: &str, renderer: &Renderer) -> Result<()> {
    let mut fresh = Vec::new();
    for source in annotation_sources(batch.ctx) {
        let extracted = source.extract(batch.ctx, book).await?;
        tracing::debug!(book = book.id, backend = %source.backend(), count = extracted.len(), "Extracted annotations");
        fresh.extend(extracted);
    }
    annotations::dedupe(&mut fresh);
    let stored = batch.catalog.field(book.id, column);
    let stored = stored.as_ref().and_then(FieldValue::as_text);
    if let Some(html) = annotations::merge(stored, &fresh, renderer)?
        && stored != Some(html.as_str())
    {
        batch.changes.push(book.id, column, Some(FieldValue::Text(html)));
    }
    Ok(())
}

#[instrument(level = "debug", skip_all)]
async fn repair_authors(batch: &mut Batch<'_>) -> Result<()> {
    let ctx = batch.ctx;
    for &id in &ctx.authors_missing {
        let Some(entry) = ctx.index.get(id) else {
            continue;
        };
        let Some(book) = resolve(ctx, id).await? else {
            continue;
        };
        let Some(native) = book.native else {
            continue;
        };
        ctx.repo.set_authors(native, &entry.authors).await.or_raise(|| ErrorKind::Explorer)?;
        tracing::info!(book = id, authors = ?entry.authors, "Repaired authors");
        batch.report.device_writes += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        for command in Command::ALL {
            assert_eq!(command.name().parse::<Command>().unwrap(), command);
        }
        assert!("send-everything".parse::<Command>().is_err());
    }

    #[test]
    fn test_all_covers_five_features() {
        assert_eq!(Command::SendAll.features().len(), 5);
        assert_eq!(Command::LoadAll.features(), Command::SendAll.features());
        assert!(Command::RepairAuthors.features().is_empty());
    }
}
