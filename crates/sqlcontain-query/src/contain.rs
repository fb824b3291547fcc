//! Containment declarations and their normalization.
//!
//! A containment declaration names the associations (and sub-associations)
//! to fetch alongside a query's primary rows. It is written either with the
//! typed builders ([`ContainSpec`], [`ContainNode`]) or as loose JSON via
//! [`ContainSpec::from_json`]. Normalization resolves every alias against
//! the registry into a [`NormalizedContain`] tree before any query runs.

use crate::association::Association;
use crate::clause::{OrderBy, OrderDirection};
use crate::expr::Expr;
use crate::registry::Table;
use regex::Regex;
use serde_json::Value as JsonValue;
use sqlcontain_core::{ALIAS_SEPARATOR, Error, Result, Value};
use std::sync::{Arc, OnceLock};

/// Option names recognized inside a JSON association map.
///
/// Every other key of such a map declares a nested association.
pub const OPTION_NAMES: [&str; 6] = [
    "associations",
    "foreignKey",
    "conditions",
    "fields",
    "sort",
    "matching",
];

/// Label used as the parent of top-level declarations in errors.
const ROOT: &str = "(root)";

const ALIAS_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn alias_regex() -> Option<&'static Regex> {
    static ALIAS: OnceLock<Option<Regex>> = OnceLock::new();
    ALIAS
        .get_or_init(|| match Regex::new(ALIAS_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(error = %e, "Alias pattern failed to compile, accepting all aliases");
                None
            }
        })
        .as_ref()
}

/// Check that `alias` can name a table or association.
///
/// Aliases are identifiers and must not contain the `__` column alias
/// separator, or reshaping could not split `Alias__field` back apart.
pub fn is_valid_alias(alias: &str) -> bool {
    if alias.contains(ALIAS_SEPARATOR) || alias.is_empty() {
        return false;
    }
    alias_regex().is_none_or(|re| re.is_match(alias))
}

/// Check whether `key` is one of the recognized option names.
pub fn is_option_name(key: &str) -> bool {
    OPTION_NAMES.contains(&key)
}

/// Override of an association's foreign key for one containment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignKey {
    /// Use these columns instead of the association's own foreign key.
    Columns(Vec<String>),
    /// Do not link by key at all; the association cannot be joined.
    Disabled,
}

/// Recognized per-association options.
#[derive(Debug, Clone, Default)]
pub struct ContainOptions {
    pub foreign_key: Option<ForeignKey>,
    /// Extra condition merged into the join or follow-up query.
    pub conditions: Option<Expr>,
    /// Explicit projection of the association's own columns.
    pub fields: Vec<String>,
    pub sort: Vec<OrderBy>,
    /// Join with INNER instead of the default join type.
    pub matching: bool,
}

impl ContainOptions {
    /// Check whether every option is at its default.
    pub fn is_empty(&self) -> bool {
        self.foreign_key.is_none()
            && self.conditions.is_none()
            && self.fields.is_empty()
            && self.sort.is_empty()
            && !self.matching
    }

    /// Whether the foreign key was explicitly disabled.
    pub fn foreign_key_disabled(&self) -> bool {
        matches!(self.foreign_key, Some(ForeignKey::Disabled))
    }

    fn merge(&mut self, other: ContainOptions) {
        if other.foreign_key.is_some() {
            self.foreign_key = other.foreign_key;
        }
        self.conditions = match (self.conditions.take(), other.conditions) {
            (Some(a), Some(b)) => Some(a.and(b)),
            (a, b) => a.or(b),
        };
        for field in other.fields {
            if !self.fields.contains(&field) {
                self.fields.push(field);
            }
        }
        self.sort.extend(other.sort);
        self.matching |= other.matching;
    }
}

/// One declared association: its options and its nested declarations.
#[derive(Debug, Clone, Default)]
pub struct ContainNode {
    pub options: ContainOptions,
    pub children: ContainSpec,
}

impl ContainNode {
    /// Create a node with default options and no children.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the foreign key with a single column.
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.options.foreign_key = Some(ForeignKey::Columns(vec![column.into()]));
        self
    }

    /// Override the foreign key with several columns.
    pub fn foreign_keys(mut self, columns: &[&str]) -> Self {
        self.options.foreign_key = Some(ForeignKey::Columns(
            columns.iter().map(|&c| c.to_string()).collect(),
        ));
        self
    }

    /// Disable key linkage; the association is always fetched separately.
    pub fn without_foreign_key(mut self) -> Self {
        self.options.foreign_key = Some(ForeignKey::Disabled);
        self
    }

    /// Add a condition (ANDed with earlier ones).
    pub fn conditions(mut self, expr: Expr) -> Self {
        self.options.conditions = Some(match self.options.conditions.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Select only these columns of the association.
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.options.fields = fields.iter().map(|&f| f.to_string()).collect();
        self
    }

    /// Add a sort order for the association's rows.
    pub fn sort(mut self, order: OrderBy) -> Self {
        self.options.sort.push(order);
        self
    }

    /// Require a matching related row (INNER join).
    pub fn matching(mut self, matching: bool) -> Self {
        self.options.matching = matching;
        self
    }

    /// Declare a nested association.
    pub fn contain(mut self, alias: impl Into<String>, node: ContainNode) -> Self {
        self.children.insert(alias, node);
        self
    }

    /// Declare a dotted path of nested associations.
    pub fn path(mut self, path: &str) -> Self {
        self.children.add_path(path);
        self
    }

    fn merge(&mut self, other: ContainNode) {
        self.options.merge(other.options);
        self.children.merge(other.children);
    }
}

/// An ordered containment declaration: alias to node.
///
/// Declaring the same alias twice merges the two declarations.
#[derive(Debug, Clone, Default)]
pub struct ContainSpec {
    entries: Vec<(String, ContainNode)>,
}

impl ContainSpec {
    /// Create an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`ContainSpec::insert`].
    #[must_use]
    pub fn with(mut self, alias: impl Into<String>, node: ContainNode) -> Self {
        self.insert(alias, node);
        self
    }

    /// Builder-style [`ContainSpec::add_path`].
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.add_path(path);
        self
    }

    /// Declare an association, merging with an existing declaration.
    pub fn insert(&mut self, alias: impl Into<String>, node: ContainNode) {
        let alias = alias.into();
        match self.entries.iter_mut().find(|(a, _)| *a == alias) {
            Some((_, existing)) => existing.merge(node),
            None => self.entries.push((alias, node)),
        }
    }

    /// Declare a dotted path (`"Comments.User"`) of empty declarations.
    ///
    /// Empty segments are ignored.
    pub fn add_path(&mut self, path: &str) {
        let parts: Vec<&str> = path
            .split('.')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if let Some(node) = nest_path(&parts, ContainNode::new()) {
            self.insert(node.0, node.1);
        }
    }

    /// Merge another declaration into this one.
    pub fn merge(&mut self, other: ContainSpec) {
        for (alias, node) in other.entries {
            self.insert(alias, node);
        }
    }

    /// Find a top-level declaration.
    pub fn get(&self, alias: &str) -> Option<&ContainNode> {
        self.entries
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, node)| node)
    }

    /// Iterate over `(alias, node)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContainNode)> {
        self.entries.iter().map(|(a, n)| (a.as_str(), n))
    }

    /// Top-level aliases in declaration order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(a, _)| a.as_str())
    }

    /// Number of top-level declarations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a loosely-typed JSON declaration.
    ///
    /// Accepted shapes:
    ///
    /// - `"Author"` or `"Comments.User"`: one (dotted) alias
    /// - `["Author", {"Comments": {...}}]`: a list of aliases and maps
    /// - `{"Author": {}, "Comments": {"sort": "created DESC", "User": {}}}`
    ///
    /// Inside an association's map, keys in [`OPTION_NAMES`] are options
    /// and every other key is a nested alias. An association named like an
    /// option must be declared through the `associations` option or the
    /// typed builders.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let mut spec = ContainSpec::new();
        parse_children(ROOT, value, &mut spec)?;
        Ok(spec)
    }
}

impl From<&str> for ContainSpec {
    fn from(path: &str) -> Self {
        ContainSpec::new().path(path)
    }
}

impl From<Vec<&str>> for ContainSpec {
    fn from(paths: Vec<&str>) -> Self {
        paths.into_iter().fold(ContainSpec::new(), ContainSpec::path)
    }
}

impl<const N: usize> From<[&str; N]> for ContainSpec {
    fn from(paths: [&str; N]) -> Self {
        paths.into_iter().fold(ContainSpec::new(), ContainSpec::path)
    }
}

/// Wrap `leaf` under every segment of `parts`, innermost last.
fn nest_path(parts: &[&str], leaf: ContainNode) -> Option<(String, ContainNode)> {
    let (last, ancestors) = parts.split_last()?;
    let mut current = ((*last).to_string(), leaf);
    for part in ancestors.iter().rev() {
        let node = ContainNode::new().contain(current.0, current.1);
        current = ((*part).to_string(), node);
    }
    Some(current)
}

fn malformed(parent: &str, alias: &str, message: impl Into<String>) -> Error {
    Error::malformed_containment(parent, alias, message)
}

/// Split and validate a (possibly dotted) alias declaration.
fn split_declared<'a>(parent: &str, key: &'a str) -> Result<Vec<&'a str>> {
    let parts: Vec<&str> = key.split('.').map(str::trim).collect();
    for part in &parts {
        if !is_valid_alias(part) {
            return Err(malformed(
                parent,
                key,
                format!(
                    "'{}' is not a valid association alias (identifier without '{}')",
                    part, ALIAS_SEPARATOR
                ),
            ));
        }
    }
    Ok(parts)
}

/// Parse a value declaring associations into `spec`.
fn parse_children(parent: &str, value: &JsonValue, spec: &mut ContainSpec) -> Result<()> {
    match value {
        JsonValue::Null => Ok(()),
        JsonValue::String(path) => {
            let parts = split_declared(parent, path)?;
            if let Some((alias, node)) = nest_path(&parts, ContainNode::new()) {
                spec.insert(alias, node);
            }
            Ok(())
        }
        JsonValue::Array(items) => {
            for item in items {
                parse_children(parent, item, spec)?;
            }
            Ok(())
        }
        JsonValue::Object(map) => {
            for (key, val) in map {
                if is_option_name(key) {
                    return Err(malformed(
                        parent,
                        key,
                        format!("option '{}' must be declared inside an association", key),
                    ));
                }
                declare(parent, key, val, spec)?;
            }
            Ok(())
        }
        other => Err(malformed(
            parent,
            &other.to_string(),
            "expected an alias, a list of aliases or a map of associations",
        )),
    }
}

/// Parse `key: val` where `key` names a (possibly dotted) association.
fn declare(parent: &str, key: &str, val: &JsonValue, spec: &mut ContainSpec) -> Result<()> {
    let parts = split_declared(parent, key)?;
    let leaf_parent = parts
        .len()
        .checked_sub(2)
        .map_or(parent, |i| parts[i]);
    let leaf_alias = parts.last().copied().unwrap_or(key);
    let leaf = parse_node(leaf_parent, leaf_alias, val)?;
    if let Some((alias, node)) = nest_path(&parts, leaf) {
        spec.insert(alias, node);
    }
    Ok(())
}

/// Parse the value declared for one association.
fn parse_node(parent: &str, alias: &str, value: &JsonValue) -> Result<ContainNode> {
    let mut node = ContainNode::new();
    match value {
        JsonValue::Null | JsonValue::Bool(true) => {}
        JsonValue::String(_) | JsonValue::Array(_) => {
            parse_children(alias, value, &mut node.children)?;
        }
        JsonValue::Object(map) => {
            for (key, val) in map {
                match key.as_str() {
                    "associations" => parse_children(alias, val, &mut node.children)?,
                    "foreignKey" => {
                        node.options.foreign_key = Some(parse_foreign_key(alias, val)?);
                    }
                    "conditions" => {
                        let expr = parse_conditions(alias, val)?;
                        node = node.conditions(expr);
                    }
                    "fields" => node.options.fields = parse_strings(alias, "fields", val)?,
                    "sort" => node.options.sort.extend(parse_sort(alias, val)?),
                    "matching" => match val {
                        JsonValue::Bool(b) => node.options.matching = *b,
                        _ => return Err(malformed(alias, "matching", "expected a boolean")),
                    },
                    _ => declare(alias, key, val, &mut node.children)?,
                }
            }
        }
        _ => {
            return Err(malformed(
                parent,
                alias,
                "expected a map of options and nested associations",
            ));
        }
    }
    Ok(node)
}

fn parse_foreign_key(alias: &str, value: &JsonValue) -> Result<ForeignKey> {
    match value {
        JsonValue::Null | JsonValue::Bool(false) => Ok(ForeignKey::Disabled),
        JsonValue::String(_) | JsonValue::Array(_) => {
            let columns = parse_strings(alias, "foreignKey", value)?;
            if columns.is_empty() {
                return Err(malformed(alias, "foreignKey", "expected at least one column"));
            }
            Ok(ForeignKey::Columns(columns))
        }
        _ => Err(malformed(
            alias,
            "foreignKey",
            "expected a column, a list of columns or false",
        )),
    }
}

fn parse_strings(alias: &str, option: &str, value: &JsonValue) -> Result<Vec<String>> {
    match value {
        JsonValue::String(s) => Ok(vec![s.clone()]),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| match item {
                JsonValue::String(s) => Ok(s.clone()),
                _ => Err(malformed(alias, option, "expected a list of strings")),
            })
            .collect(),
        _ => Err(malformed(alias, option, "expected a string or a list of strings")),
    }
}

fn parse_sort(alias: &str, value: &JsonValue) -> Result<Vec<OrderBy>> {
    let parse_one = |spec: &str| {
        OrderBy::parse(spec)
            .ok_or_else(|| malformed(alias, "sort", format!("invalid sort '{}'", spec)))
    };
    match value {
        JsonValue::String(s) => Ok(vec![parse_one(s)?]),
        JsonValue::Array(_) => parse_strings(alias, "sort", value)?
            .iter()
            .map(|s| parse_one(s))
            .collect(),
        JsonValue::Object(map) => map
            .iter()
            .map(|(column, dir)| {
                let direction = dir
                    .as_str()
                    .and_then(OrderDirection::parse)
                    .ok_or_else(|| {
                        malformed(alias, "sort", format!("invalid direction for '{}'", column))
                    })?;
                Ok(match direction {
                    OrderDirection::Asc => OrderBy::asc(column.as_str()),
                    OrderDirection::Desc => OrderBy::desc(column.as_str()),
                })
            })
            .collect(),
        _ => Err(malformed(alias, "sort", "expected a string, a list or a map")),
    }
}

/// Parse conditions: a raw SQL string, a `{column: value}` map or a list.
///
/// A NULL value compares with IS NULL, a list with IN.
fn parse_conditions(alias: &str, value: &JsonValue) -> Result<Expr> {
    let expr = match value {
        JsonValue::String(sql) => Some(Expr::raw(sql.clone())),
        JsonValue::Object(map) => Expr::all(map.iter().map(|(column, val)| {
            let col = Expr::col(column.as_str());
            match val {
                JsonValue::Null => col.is_null(),
                JsonValue::Array(items) => {
                    col.in_list(items.iter().map(Value::from).collect::<Vec<Value>>())
                }
                other => col.eq(Value::from(other)),
            }
        })),
        JsonValue::Array(items) => {
            let parts = items
                .iter()
                .map(|item| parse_conditions(alias, item))
                .collect::<Result<Vec<_>>>()?;
            Expr::all(parts)
        }
        _ => None,
    };
    expr.ok_or_else(|| malformed(alias, "conditions", "expected SQL, a column map or a list"))
}

/// A resolved containment node.
#[derive(Debug)]
pub struct NormalizedNode {
    /// The alias the association was declared under.
    pub alias: String,
    pub instance: Arc<Association>,
    /// Recognized options only.
    pub config: ContainOptions,
    pub can_be_joined: bool,
    /// Nested nodes, resolved against the association's target.
    pub associations: Arc<NormalizedContain>,
}

/// A fully resolved containment tree, one node per declared alias.
#[derive(Debug, Default)]
pub struct NormalizedContain {
    nodes: Vec<Arc<NormalizedNode>>,
}

impl NormalizedContain {
    pub fn new(nodes: Vec<Arc<NormalizedNode>>) -> Self {
        Self { nodes }
    }

    /// Top-level nodes in declaration order.
    pub fn nodes(&self) -> &[Arc<NormalizedNode>] {
        &self.nodes
    }

    /// Find a top-level node.
    pub fn get(&self, alias: &str) -> Option<&Arc<NormalizedNode>> {
        self.nodes.iter().find(|n| n.alias == alias)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes at every depth.
    pub fn total_nodes(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| 1 + n.associations.total_nodes())
            .sum()
    }
}

/// A query's containment: as declared, or already resolved.
#[derive(Debug, Clone)]
pub enum Contain {
    Raw(ContainSpec),
    Normalized(Arc<NormalizedContain>),
}

impl Default for Contain {
    fn default() -> Self {
        Contain::Raw(ContainSpec::new())
    }
}

impl Contain {
    /// Check if nothing is contained.
    pub fn is_empty(&self) -> bool {
        match self {
            Contain::Raw(spec) => spec.is_empty(),
            Contain::Normalized(tree) => tree.is_empty(),
        }
    }
}

/// Resolve a containment against `source`.
///
/// An already normalized tree is returned as-is, without touching the
/// registry.
#[tracing::instrument(level = "debug", skip_all, fields(source = %source.alias()))]
pub fn normalize(source: &Table, contain: &Contain) -> Result<Arc<NormalizedContain>> {
    match contain {
        Contain::Normalized(tree) => {
            tracing::trace!("Containment already normalized");
            Ok(Arc::clone(tree))
        }
        Contain::Raw(spec) => {
            let tree = normalize_spec(source, spec)?;
            tracing::debug!(nodes = tree.total_nodes(), "Normalized containment");
            Ok(Arc::new(tree))
        }
    }
}

fn normalize_spec(source: &Table, spec: &ContainSpec) -> Result<NormalizedContain> {
    spec.iter()
        .map(|(alias, node)| normalize_node(source, alias, node).map(Arc::new))
        .collect::<Result<Vec<_>>>()
        .map(NormalizedContain::new)
}

/// Resolve one declared association and, recursively, its children.
pub fn normalize_node(source: &Table, alias: &str, node: &ContainNode) -> Result<NormalizedNode> {
    let instance = source
        .association(alias)
        .ok_or_else(|| Error::unknown_association(source.alias(), alias))?;

    instance.validate_options(&node.options)?;

    let associations = if node.children.is_empty() {
        Arc::default()
    } else {
        let target = instance.target()?;
        Arc::new(normalize_spec(&target, &node.children)?)
    };

    let can_be_joined = instance.can_be_joined(&node.options);
    tracing::trace!(
        source = source.alias(),
        alias = alias,
        kind = instance.kind().name(),
        can_be_joined,
        "Resolved contained association"
    );

    Ok(NormalizedNode {
        alias: alias.to_string(),
        instance,
        config: node.options.clone(),
        can_be_joined,
        associations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alias_validation() {
        assert!(is_valid_alias("Author"));
        assert!(is_valid_alias("_private2"));
        assert!(!is_valid_alias("2fast"));
        assert!(!is_valid_alias("Bad__Alias"));
        assert!(!is_valid_alias("has space"));
        assert!(!is_valid_alias(""));
    }

    #[test]
    fn test_dotted_paths_nest() {
        let spec = ContainSpec::from(["Author", "Comments.User", "Comments.Likes"]);
        assert_eq!(spec.aliases().collect::<Vec<_>>(), vec!["Author", "Comments"]);
        let comments = spec.get("Comments").unwrap();
        assert_eq!(
            comments.children.aliases().collect::<Vec<_>>(),
            vec!["User", "Likes"]
        );
    }

    #[test]
    fn test_insert_merges_same_alias() {
        let spec = ContainSpec::new()
            .with("Comments", ContainNode::new().fields(&["id"]))
            .with(
                "Comments",
                ContainNode::new().fields(&["body"]).path("User"),
            );
        assert_eq!(spec.len(), 1);
        let comments = spec.get("Comments").unwrap();
        assert_eq!(comments.options.fields, vec!["id", "body"]);
        assert!(comments.children.get("User").is_some());
    }

    #[test]
    fn test_from_json_options_and_children() {
        let spec = ContainSpec::from_json(&json!({
            "Author": {},
            "Comments": {
                "fields": ["id", "body"],
                "sort": "created DESC",
                "conditions": {"published": true},
                "matching": true,
                "User": {"fields": "name"}
            }
        }))
        .unwrap();

        assert_eq!(spec.aliases().collect::<Vec<_>>(), vec!["Author", "Comments"]);
        let comments = spec.get("Comments").unwrap();
        assert_eq!(comments.options.fields, vec!["id", "body"]);
        assert_eq!(comments.options.sort.len(), 1);
        assert!(comments.options.conditions.is_some());
        assert!(comments.options.matching);
        let user = comments.children.get("User").unwrap();
        assert_eq!(user.options.fields, vec!["name"]);
    }

    #[test]
    fn test_from_json_list_and_associations_option() {
        let spec = ContainSpec::from_json(&json!([
            "Author",
            {"Comments": {"associations": ["User", "fields"]}}
        ]))
        .unwrap();
        let comments = spec.get("Comments").unwrap();
        // The explicit option declares an association literally named "fields".
        assert_eq!(
            comments.children.aliases().collect::<Vec<_>>(),
            vec!["User", "fields"]
        );
        assert!(comments.options.fields.is_empty());
    }

    #[test]
    fn test_from_json_foreign_key_forms() {
        let spec = ContainSpec::from_json(&json!({
            "Author": {"foreignKey": false},
            "Editor": {"foreignKey": "editor_id"}
        }))
        .unwrap();
        assert!(spec.get("Author").unwrap().options.foreign_key_disabled());
        assert_eq!(
            spec.get("Editor").unwrap().options.foreign_key,
            Some(ForeignKey::Columns(vec!["editor_id".to_string()]))
        );
    }

    #[test]
    fn test_from_json_rejects_malformed_values() {
        let err = ContainSpec::from_json(&json!({"Comments": 5})).unwrap_err();
        assert!(err.is_malformed_containment());
        assert_eq!(err.as_contain().unwrap().alias, "Comments");

        let err = ContainSpec::from_json(&json!({"Comments": {"matching": "yes"}})).unwrap_err();
        assert!(err.is_malformed_containment());

        let err = ContainSpec::from_json(&json!({"fields": ["id"]})).unwrap_err();
        assert!(err.is_malformed_containment());

        let err = ContainSpec::from_json(&json!(["Bad__Alias"])).unwrap_err();
        assert!(err.is_malformed_containment());
    }

    #[test]
    fn test_dotted_key_with_options_applies_to_leaf() {
        let spec = ContainSpec::from_json(&json!({"Comments.User": {"fields": ["name"]}})).unwrap();
        let comments = spec.get("Comments").unwrap();
        assert!(comments.options.fields.is_empty());
        assert_eq!(
            comments.children.get("User").unwrap().options.fields,
            vec!["name"]
        );
    }
}
