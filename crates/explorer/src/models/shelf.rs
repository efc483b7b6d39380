/// A named shelf ("collection") on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shelf {
    pub id: i64,
    pub name: String,
    /// The shelf itself was removed on the device but its row survives.
    pub is_deleted: bool,
    pub ts: Option<i64>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ShelfRow {
    id: i64,
    name: String,
    is_deleted: Option<i64>,
    ts: Option<i64>,
}
impl From<ShelfRow> for Shelf {
    fn from(row: ShelfRow) -> Self {
        Self { id: row.id, name: row.name, is_deleted: row.is_deleted.unwrap_or(0) != 0, ts: row.ts }
    }
}

/// One book's membership of one shelf.
///
/// A membership with `is_deleted` set is a book that *was* on the shelf and
/// has been removed, which is not the same as never having been on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub shelf_id: i64,
    pub name: String,
    pub is_deleted: bool,
    /// The shelf itself is deleted; the row is kept but counts for nothing.
    pub shelf_deleted: bool,
    pub ts: Option<i64>,
}
impl Membership {
    pub fn is_active(&self) -> bool {
        !self.is_deleted && !self.shelf_deleted
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MembershipRow {
    shelf_id: i64,
    name: String,
    is_deleted: Option<i64>,
    shelf_deleted: Option<i64>,
    ts: Option<i64>,
}
impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Self {
            shelf_id: row.shelf_id,
            name: row.name,
            is_deleted: row.is_deleted.unwrap_or(0) != 0,
            shelf_deleted: row.shelf_deleted.unwrap_or(0) != 0,
            ts: row.ts,
        }
    }
}
