//! Named-route resolution. Controllers hand the dispatcher a route name plus
//! params; this table turns it into a concrete URL. Params without a
//! placeholder in the pattern are appended as query-string pairs.

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub trait RouteResolver: Send + Sync {
    fn resolve(&self, name: &str, params: &[(String, String)]) -> Option<String>;
}

static DEFAULT_ROUTES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("cursos.index", "/cursos"),
        ("cursos.show", "/cursos/{curso}"),
        ("contenidos.show", "/contenidos/{contenido}"),
        ("trabajos.show", "/trabajos/{trabajo}"),
        ("dashboard", "/"),
    ]
});

pub struct NamedRoutes {
    table: HashMap<String, String>,
}

impl NamedRoutes {
    pub fn new() -> Self {
        Self { table: HashMap::new() }
    }

    pub fn with_defaults() -> Self {
        let mut routes = Self::new();
        for (name, pattern) in DEFAULT_ROUTES.iter().copied() {
            routes.register(name, pattern);
        }
        routes
    }

    pub fn register(&mut self, name: &str, pattern: &str) {
        self.table.insert(name.to_string(), pattern.to_string());
    }
}

impl Default for NamedRoutes {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl RouteResolver for NamedRoutes {
    fn resolve(&self, name: &str, params: &[(String, String)]) -> Option<String> {
        let pattern = self.table.get(name)?;
        let mut url = pattern.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        for (key, value) in params {
            let placeholder = format!("{{{}}}", key);
            if url.contains(&placeholder) {
                url = url.replace(&placeholder, value);
            } else {
                query.push((key.clone(), value.clone()));
            }
        }
        if !query.is_empty() {
            let qs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            url.push('?');
            url.push_str(&qs.join("&"));
        }
        Some(url)
    }
}
