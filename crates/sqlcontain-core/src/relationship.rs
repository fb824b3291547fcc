//! Relationship metadata for SQLContain Rust.
//!
//! An association's kind decides two things: whether it can be folded into
//! the primary query as a join without changing the primary row count, and
//! which columns connect the two tables when it cannot.

/// The kind of relationship between a source table and its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationKind {
    /// Many-to-one: the source row holds the foreign key (`Article` belongs to `Author`).
    BelongsTo,
    /// One-to-one: the target row holds the foreign key (`User` has one `Profile`).
    HasOne,
    /// One-to-many: many target rows point at the source (`Article` has many `Comments`).
    HasMany,
    /// Many-to-many through a link table (`Article` belongs to many `Tags`).
    BelongsToMany {
        /// The link table joining both sides.
        through: LinkTableInfo,
    },
}

impl AssociationKind {
    /// Create a many-to-many kind through `through`.
    pub fn belongs_to_many(through: LinkTableInfo) -> Self {
        AssociationKind::BelongsToMany { through }
    }

    /// Whether related rows can be joined without multiplying source rows.
    pub const fn is_joinable(&self) -> bool {
        matches!(self, AssociationKind::BelongsTo | AssociationKind::HasOne)
    }

    /// Whether at most one target row relates to each source row.
    pub const fn is_single(&self) -> bool {
        self.is_joinable()
    }

    /// Whether the foreign key lives on the source table.
    pub const fn is_owning_side(&self) -> bool {
        matches!(self, AssociationKind::BelongsTo)
    }

    /// The link table, for many-to-many kinds.
    pub fn link_table(&self) -> Option<&LinkTableInfo> {
        match self {
            AssociationKind::BelongsToMany { through } => Some(through),
            _ => None,
        }
    }

    /// The fetch strategy used when none is configured.
    pub const fn default_strategy(&self) -> Strategy {
        if self.is_joinable() {
            Strategy::Join
        } else {
            Strategy::Select
        }
    }

    /// Short name used in logs and error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            AssociationKind::BelongsTo => "belongsTo",
            AssociationKind::HasOne => "hasOne",
            AssociationKind::HasMany => "hasMany",
            AssociationKind::BelongsToMany { .. } => "belongsToMany",
        }
    }
}

/// How an association's rows are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Fold into the primary query as a join.
    #[default]
    Join,
    /// Follow-up query filtered by a list of collected parent keys.
    Select,
    /// Follow-up query correlated through a sub-query of the primary query.
    Subquery,
}

impl Strategy {
    /// Whether the follow-up query needs concrete parent key values.
    pub const fn requires_keys(self) -> bool {
        matches!(self, Strategy::Select)
    }

    /// Parse a strategy name (`join`, `select`, `subquery`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "join" => Some(Strategy::Join),
            "select" => Some(Strategy::Select),
            "subquery" => Some(Strategy::Subquery),
            _ => None,
        }
    }
}

/// Information about a link/join table for many-to-many relationships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTableInfo {
    /// The link table alias (e.g., `"ArticlesTags"`).
    pub table: String,

    /// Column in the link table pointing to the source (e.g., `"article_id"`).
    pub source_column: String,

    /// Column in the link table pointing to the target (e.g., `"tag_id"`).
    pub target_column: String,
}

impl LinkTableInfo {
    /// Create a new link-table definition.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
        }
    }
}
