//! Typed locations: route types that know their own path.
//!
//! # Responsibilities
//! - Describe a route as a Rust type ([`Location`])
//! - Build and cache per-type metadata ([`LocationInfo`])
//! - Render a location value as an href, and decode one from a request
//!
//! # Design Decisions
//! - Nesting is declared with `type Parent`; the full pattern is the
//!   parent's pattern followed by the location's own
//! - Declared parameters that don't appear in the path travel in the query
//! - Advisories go through an injectable logger, `tracing::warn!` by default

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::routing::error::LocationError;
use crate::routing::parameters::Parameters;
use crate::routing::pattern::RouteLocationPattern;

/// Sink for diagnostic advisories.
pub type LocationLogger = Arc<dyn Fn(&str) + Send + Sync>;

/// A route described as a type.
///
/// ```ignore
/// struct User { id: u32, tab: Option<String> }
///
/// impl Location for User {
///     const PATH: &'static str = "/users/{id}";
///     const PARAMETERS: &'static [&'static str] = &["id", "tab"];
///     type Parent = Root;
///
///     fn to_parameters(&self, out: &mut Parameters) {
///         out.append_all("id", self.id.to_values());
///         out.append_all("tab", self.tab.to_values());
///     }
///
///     fn from_parameters(params: &Parameters) -> Result<Self, LocationError> {
///         Ok(Self {
///             id: u32::from_values("id", params.get_all("id"))?,
///             tab: Option::from_values("tab", params.get_all("tab"))?,
///         })
///     }
/// }
/// ```
pub trait Location: Sized + Send + Sync + 'static {
    /// Template relative to the parent location.
    const PATH: &'static str;

    /// Names of the fields this location carries itself (path or query).
    const PARAMETERS: &'static [&'static str] = &[];

    /// Enclosing location, [`Root`] for top-level ones.
    type Parent: Location;

    /// Write every field, including the parent's.
    fn to_parameters(&self, parameters: &mut Parameters);

    fn from_parameters(parameters: &Parameters) -> Result<Self, LocationError>;
}

/// The implicit parent of top-level locations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Root;

impl Location for Root {
    const PATH: &'static str = "/";
    type Parent = Root;

    fn to_parameters(&self, _parameters: &mut Parameters) {}

    fn from_parameters(_parameters: &Parameters) -> Result<Self, LocationError> {
        Ok(Root)
    }
}

/// Metadata computed once per location type.
#[derive(Debug, Clone)]
pub struct LocationInfo {
    pub type_name: &'static str,
    pub parent: Option<Arc<LocationInfo>>,
    /// Full pattern, parent segments first.
    pub pattern: RouteLocationPattern,
    pub path_parameters: Vec<String>,
    pub query_parameters: Vec<String>,
}

impl LocationInfo {
    fn declares_parameters(&self) -> bool {
        !self.path_parameters.is_empty() || !self.query_parameters.is_empty()
    }
}

/// Registry of location metadata.
pub struct Locations {
    infos: DashMap<TypeId, Arc<LocationInfo>>,
    logger: LocationLogger,
}

impl Locations {
    pub fn new() -> Self {
        Self::with_logger(Arc::new(|message: &str| {
            tracing::warn!(target: "interlace::locations", "{}", message)
        }))
    }

    pub fn with_logger(logger: LocationLogger) -> Self {
        Self {
            infos: DashMap::new(),
            logger,
        }
    }

    /// Metadata for `L`, built on first use.
    pub fn info<L: Location>(&self) -> Result<Arc<LocationInfo>, LocationError> {
        self.info_in::<L>(&mut Vec::new())
    }

    /// Path and query for `location`, e.g. `/users/1?tab=posts`.
    pub fn href<L: Location>(&self, location: &L) -> Result<String, LocationError> {
        let info = self.info::<L>()?;
        let mut parameters = Parameters::new();
        location.to_parameters(&mut parameters);

        let path = info.pattern.format(&parameters)?;
        let mut query = Parameters::new();
        for name in &info.query_parameters {
            let values = parameters.get_all(name);
            if !values.is_empty() {
                query.append_all(name.as_str(), values.iter().cloned());
            }
        }

        if query.is_empty() {
            Ok(path)
        } else {
            Ok(format!("{}?{}", path, query.form_url_encode()))
        }
    }

    /// Decode `L` from a request path and its query parameters.
    ///
    /// Path values win over query values with the same name.
    pub fn resolve<L: Location>(&self, path: &str, query: &Parameters) -> Result<L, LocationError> {
        let info = self.info::<L>()?;
        let mut parameters = info.pattern.parse(path)?;
        for (name, values) in query.iter() {
            if !parameters.contains(name) {
                parameters.append_all(name, values.iter().cloned());
            }
        }
        L::from_parameters(&parameters)
    }

    /// Like [`resolve`](Self::resolve) for a `path?query` string.
    pub fn resolve_uri<L: Location>(&self, uri: &str) -> Result<L, LocationError> {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        self.resolve(path, &Parameters::parse_query(query))
    }

    /// True if `path` matches `L`'s pattern.
    pub fn matches<L: Location>(&self, path: &str) -> bool {
        self.info::<L>()
            .map(|info| info.pattern.matches(path))
            .unwrap_or(false)
    }

    fn info_in<L: Location>(&self, visiting: &mut Vec<TypeId>) -> Result<Arc<LocationInfo>, LocationError> {
        let id = TypeId::of::<L>();
        if let Some(info) = self.infos.get(&id) {
            return Ok(Arc::clone(info.value()));
        }
        if visiting.contains(&id) {
            return Err(LocationError::Cyclic(type_name::<L>().to_string()));
        }
        visiting.push(id);
        let built = self.build::<L>(visiting);
        visiting.pop();

        let info = Arc::new(built?);
        Ok(Arc::clone(self.infos.entry(id).or_insert(info).value()))
    }

    fn build<L: Location>(&self, visiting: &mut Vec<TypeId>) -> Result<LocationInfo, LocationError> {
        let own = RouteLocationPattern::new(L::PATH)?;
        let own_path: Vec<String> = own.parameter_names().into_iter().map(String::from).collect();

        let unbound: Vec<String> = own_path
            .iter()
            .filter(|name| !L::PARAMETERS.contains(&name.as_str()))
            .cloned()
            .collect();
        if !unbound.is_empty() {
            return Err(LocationError::UnboundPathParameters {
                location: type_name::<L>().to_string(),
                names: unbound,
            });
        }

        let parent = if TypeId::of::<L::Parent>() == TypeId::of::<Root>() || TypeId::of::<L>() == TypeId::of::<Root>() {
            None
        } else {
            Some(self.info_in::<L::Parent>(visiting)?)
        };

        let (pattern, mut query_parameters) = match &parent {
            Some(parent_info) => {
                if L::PARAMETERS.is_empty() && !parent_info.declares_parameters() {
                    (self.logger)(&format!(
                        "Location `{}` and its parent `{}` carry no parameters; \
                         declare a single location with the combined path instead of nesting",
                        type_name::<L>(),
                        parent_info.type_name
                    ));
                }
                (
                    parent_info.pattern.concat(&own)?,
                    parent_info.query_parameters.clone(),
                )
            }
            None => (own, Vec::new()),
        };

        for name in L::PARAMETERS {
            let name = name.to_string();
            if !own_path.contains(&name) && !query_parameters.contains(&name) {
                query_parameters.push(name);
            }
        }

        let path_parameters = pattern.parameter_names().into_iter().map(String::from).collect();

        tracing::debug!(
            location = type_name::<L>(),
            pattern = %pattern,
            "Registered location"
        );

        Ok(LocationInfo {
            type_name: type_name::<L>(),
            parent,
            pattern,
            path_parameters,
            query_parameters,
        })
    }
}

impl Default for Locations {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Locations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locations")
            .field("cached", &self.infos.len())
            .finish()
    }
}
