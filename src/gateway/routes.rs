//! Fixed HTTP route table for `pb.Auth`.

use std::collections::HashMap;
use std::fmt;

use http::Method;
use percent_encoding::percent_decode_str;

use super::error_mapping::GatewayError;

/// RPC methods of `pb.Auth` reachable through the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    Login,
    GetUser,
}

impl RpcMethod {
    /// Method name as declared in the service.
    pub fn name(self) -> &'static str {
        match self {
            RpcMethod::Login => "Login",
            RpcMethod::GetUser => "GetUser",
        }
    }
}

/// Which part of the HTTP body feeds the request message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyBinding {
    /// The body is not read.
    None,
    /// The whole body is a JSON object of request fields.
    Whole,
}

/// One entry of the route table.
#[derive(Clone, Debug)]
pub struct Route {
    pub method: Method,
    /// matchit template, e.g. `/user/{user_id}`.
    pub template: &'static str,
    pub rpc: RpcMethod,
    pub body: BodyBinding,
}

impl Route {
    pub fn new(method: Method, template: &'static str, rpc: RpcMethod, body: BodyBinding) -> Self {
        Self {
            method,
            template,
            rpc,
            body,
        }
    }
}

/// Routes exposed for `pb.Auth`.
pub fn auth_routes() -> Vec<Route> {
    vec![
        Route::new(Method::POST, "/login", RpcMethod::Login, BodyBinding::Whole),
        Route::new(
            Method::GET,
            "/user/{user_id}",
            RpcMethod::GetUser,
            BodyBinding::None,
        ),
        Route::new(Method::POST, "/user", RpcMethod::GetUser, BodyBinding::Whole),
    ]
}

/// A resolved route with its decoded path parameters.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: Vec<(String, String)>,
}

/// Lookup structure over a fixed list of routes.
pub struct RouteTable {
    routes: Vec<Route>,
    by_method: HashMap<Method, matchit::Router<usize>>,
    by_path: matchit::Router<Vec<Method>>,
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .finish()
    }
}

impl RouteTable {
    /// Builds the table.
    ///
    /// # Errors
    /// Fails if two routes conflict or a template is malformed.
    pub fn new(routes: Vec<Route>) -> Result<Self, matchit::InsertError> {
        let mut by_method: HashMap<Method, matchit::Router<usize>> = HashMap::new();
        let mut methods_per_template: Vec<(&'static str, Vec<Method>)> = Vec::new();

        for (index, route) in routes.iter().enumerate() {
            by_method
                .entry(route.method.clone())
                .or_insert_with(matchit::Router::new)
                .insert(route.template, index)?;

            match methods_per_template
                .iter_mut()
                .find(|(template, _)| *template == route.template)
            {
                Some((_, methods)) => methods.push(route.method.clone()),
                None => methods_per_template.push((route.template, vec![route.method.clone()])),
            }
        }

        let mut by_path = matchit::Router::new();
        for (template, methods) in methods_per_template {
            by_path.insert(template, methods)?;
        }

        Ok(Self {
            routes,
            by_method,
            by_path,
        })
    }

    /// The `pb.Auth` table.
    pub fn auth() -> Result<Self, matchit::InsertError> {
        Self::new(auth_routes())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Finds the route for `method` and `path`.
    ///
    /// # Errors
    /// [`GatewayError::MethodNotAllowed`] when the path exists under other
    /// methods, [`GatewayError::RouteNotFound`] otherwise.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch<'_>, GatewayError> {
        if let Some(matched) = self
            .by_method
            .get(method)
            .and_then(|router| router.at(path).ok())
        {
            let params = matched
                .params
                .iter()
                .map(|(key, value)| {
                    (
                        key.to_string(),
                        percent_decode_str(value).decode_utf8_lossy().into_owned(),
                    )
                })
                .collect();

            return Ok(RouteMatch {
                route: &self.routes[*matched.value],
                params,
            });
        }

        match self.by_path.at(path) {
            Ok(matched) => Err(GatewayError::MethodNotAllowed {
                method: method.clone(),
                path: path.to_string(),
                allowed: matched.value.clone(),
            }),
            Err(_) => Err(GatewayError::RouteNotFound {
                method: method.clone(),
                path: path.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_login() {
        let table = RouteTable::auth().unwrap();
        let matched = table.resolve(&Method::POST, "/login").unwrap();
        assert_eq!(matched.route.rpc, RpcMethod::Login);
        assert_eq!(matched.route.body, BodyBinding::Whole);
        assert!(matched.params.is_empty());
    }

    #[test]
    fn extracts_path_parameters() {
        let table = RouteTable::auth().unwrap();
        let matched = table.resolve(&Method::GET, "/user/42").unwrap();
        assert_eq!(matched.route.rpc, RpcMethod::GetUser);
        assert_eq!(
            matched.params,
            vec![("user_id".to_string(), "42".to_string())]
        );
    }

    #[test]
    fn decodes_percent_encoded_parameters() {
        let table = RouteTable::auth().unwrap();
        let matched = table.resolve(&Method::GET, "/user/%34%32").unwrap();
        assert_eq!(matched.params[0].1, "42");
    }

    #[test]
    fn wrong_method_is_not_allowed() {
        let table = RouteTable::auth().unwrap();
        match table.resolve(&Method::GET, "/login") {
            Err(GatewayError::MethodNotAllowed { allowed, .. }) => {
                assert_eq!(allowed, vec![Method::POST]);
            }
            other => panic!("expected MethodNotAllowed, got {other:?}"),
        }
    }

    #[test]
    fn unknown_path_is_not_found() {
        let table = RouteTable::auth().unwrap();
        assert!(matches!(
            table.resolve(&Method::POST, "/logout"),
            Err(GatewayError::RouteNotFound { .. })
        ));
        assert!(matches!(
            table.resolve(&Method::GET, "/user/42/extra"),
            Err(GatewayError::RouteNotFound { .. })
        ));
    }

    #[test]
    fn conflicting_routes_are_rejected() {
        let routes = vec![
            Route::new(Method::GET, "/user/{id}", RpcMethod::GetUser, BodyBinding::None),
            Route::new(Method::GET, "/user/{user_id}", RpcMethod::GetUser, BodyBinding::None),
        ];
        assert!(RouteTable::new(routes).is_err());
    }
}
