//! Per call query state.
use chrono_tz::Tz;
use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    Value,
    native::Format,
    settings::{SettingValue, Settings},
    sql::{BindError, Params},
};

/// Rename hook applied once per result set to the column names.
pub trait ColumnRename: Send + Sync + 'static {
    fn rename(&self, name: &str) -> String;
}

impl<F> ColumnRename for F
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    fn rename(&self, name: &str) -> String {
        self(name)
    }
}

/// Preferred result orientation for [`QueryResult::result_set`][1].
///
/// [1]: crate::QueryResult::result_set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Rows,
    Columns,
}

/// Settings and formatting preferences, shared with the client default until
/// a call modifies them.
#[derive(Clone)]
pub(crate) struct Preferences {
    pub(crate) settings: Settings,
    pub(crate) query_tz: Option<Tz>,
    pub(crate) column_tz: HashMap<String, Tz>,
    pub(crate) use_none: bool,
    pub(crate) orientation: Orientation,
    pub(crate) rename: Option<Arc<dyn ColumnRename>>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            settings: Settings::new(),
            query_tz: None,
            column_tz: HashMap::new(),
            use_none: true,
            orientation: Orientation::Rows,
            rename: None,
        }
    }
}

impl fmt::Debug for Preferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preferences")
            .field("settings", &self.settings)
            .field("query_tz", &self.query_tz)
            .field("column_tz", &self.column_tz)
            .field("use_none", &self.use_none)
            .field("orientation", &self.orientation)
            .field("rename", &self.rename.is_some())
            .finish()
    }
}

/// Query text, parameters, settings and formatting preferences of one call.
///
/// Created from the client defaults, which are only copied when the call
/// changes one of them.
#[derive(Debug, Clone)]
pub struct QueryContext {
    query: String,
    params: Params,
    query_id: Option<String>,
    bind_error: Option<BindError>,
    prefs: Arc<Preferences>,
}

impl QueryContext {
    pub(crate) fn new(query: impl Into<String>, defaults: &Arc<Preferences>) -> Self {
        Self {
            query: query.into(),
            params: Params::default(),
            query_id: None,
            bind_error: None,
            prefs: defaults.clone(),
        }
    }

    fn prefs_mut(&mut self) -> &mut Preferences {
        Arc::make_mut(&mut self.prefs)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn settings(&self) -> &Settings {
        &self.prefs.settings
    }

    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    pub(crate) fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    /// Bind named parameter, the first binding error is reported on execute.
    pub(crate) fn bind_named(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        if let Err(err) = self.params.push_named(name.into(), value.into()) {
            self.bind_error.get_or_insert(err);
        }
    }

    pub(crate) fn bind_positional(&mut self, value: impl Into<Value>) {
        if let Err(err) = self.params.push_positional(value.into()) {
            self.bind_error.get_or_insert(err);
        }
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub(crate) fn set_query_id(&mut self, id: impl Into<String>) {
        self.query_id = Some(id.into());
    }

    pub(crate) fn set_setting(&mut self, key: impl Into<String>, value: impl SettingValue) {
        self.prefs_mut().settings.set(key, value);
    }

    pub(crate) fn set_query_tz(&mut self, tz: Tz) {
        self.prefs_mut().query_tz = Some(tz);
    }

    pub(crate) fn set_column_tz(&mut self, column: impl Into<String>, tz: Tz) {
        self.prefs_mut().column_tz.insert(column.into(), tz);
    }

    pub(crate) fn set_use_none(&mut self, use_none: bool) {
        self.prefs_mut().use_none = use_none;
    }

    pub(crate) fn set_orientation(&mut self, orientation: Orientation) {
        self.prefs_mut().orientation = orientation;
    }

    pub(crate) fn set_rename(&mut self, rename: Arc<dyn ColumnRename>) {
        self.prefs_mut().rename = Some(rename);
    }

    /// Final query text and `param_*` fields.
    pub(crate) fn bind(&self) -> Result<(String, Vec<(String, String)>), BindError> {
        if let Some(err) = &self.bind_error {
            return Err(err.clone());
        }
        self.params.bind(&self.query)
    }

    /// Decoding format, `server_tz` applies when no query level timezone is
    /// set.
    pub(crate) fn format(&self, server_tz: Option<Tz>) -> Format {
        Format {
            use_none: self.prefs.use_none,
            default_tz: self.prefs.query_tz.or(server_tz).unwrap_or(Tz::UTC),
            column_tz: self.prefs.column_tz.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn copy_on_write() {
        let defaults = Arc::new(Preferences::default());

        let untouched = QueryContext::new("SELECT 1", &defaults);
        assert!(Arc::ptr_eq(&untouched.prefs, &defaults));

        let mut changed = QueryContext::new("SELECT 1", &defaults);
        changed.bind_named("a", 1u8);
        assert!(Arc::ptr_eq(&changed.prefs, &defaults));

        changed.set_setting("max_threads", 1u8);
        assert!(!Arc::ptr_eq(&changed.prefs, &defaults));
        assert_eq!(changed.settings().get("max_threads"), Some("1"));
        assert!(defaults.settings.is_empty());
    }

    #[test]
    fn timezone_precedence_in_format() {
        let defaults = Arc::new(Preferences::default());
        let mut ctx = QueryContext::new("SELECT now()", &defaults);

        assert_eq!(ctx.format(None).default_tz, Tz::UTC);
        assert_eq!(ctx.format(Some(Tz::Europe__Berlin)).default_tz, Tz::Europe__Berlin);

        ctx.set_query_tz(Tz::Asia__Tokyo);
        assert_eq!(ctx.format(Some(Tz::Europe__Berlin)).default_tz, Tz::Asia__Tokyo);
    }

    #[test]
    fn deferred_bind_error() {
        let defaults = Arc::new(Preferences::default());
        let mut ctx = QueryContext::new("SELECT %s", &defaults);
        ctx.bind_named("a", 1u8);
        ctx.bind_positional(2u8);
        assert!(matches!(ctx.bind(), Err(BindError::Mixed)));
    }

    #[test]
    fn rename_closure() {
        let rename: Arc<dyn ColumnRename> = Arc::new(|name: &str| name.to_uppercase());
        assert_eq!(rename.rename("id"), "ID");
    }
}
