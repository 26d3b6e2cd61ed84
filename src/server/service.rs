use std::time::Instant;

use metrics::{counter, histogram};
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::proto::auth_server::Auth;
use crate::proto::{GetUserRequest, GetUserResponse, UserRequest, UserResponse};

/// Access token handed out by the stub `Login`.
pub const STUB_ACCESS_TOKEN: &str = "123";

/// User id returned by the stub `GetUser`, whatever was asked for.
pub const STUB_USER_ID: i64 = 1000;

/// gRPC service implementation for `pb.Auth`.
///
/// Stateless: every response depends only on the current call.
#[derive(Clone, Debug, Default)]
pub struct AuthServiceImpl;

impl AuthServiceImpl {
    /// Creates a new authentication service.
    pub fn new() -> Self {
        Self
    }

    fn has_authorization(metadata: &MetadataMap) -> bool {
        metadata.get("authorization").is_some()
    }
}

#[tonic::async_trait]
impl Auth for AuthServiceImpl {
    async fn login(&self, request: Request<UserRequest>) -> Result<Response<UserResponse>, Status> {
        let start = Instant::now();
        counter!("auth.login.requests").increment(1);

        debug!(
            authorization = Self::has_authorization(request.metadata()),
            "login metadata"
        );

        let req = request.into_inner();
        info!("Received: {}", req.username);

        histogram!("auth.login.duration").record(start.elapsed().as_secs_f64());

        Ok(Response::new(UserResponse {
            access_token: STUB_ACCESS_TOKEN.to_string(),
        }))
    }

    async fn get_user(
        &self,
        request: Request<GetUserRequest>,
    ) -> Result<Response<GetUserResponse>, Status> {
        counter!("auth.get_user.requests").increment(1);

        debug!(
            authorization = Self::has_authorization(request.metadata()),
            requested = request.get_ref().user_id,
            "get_user"
        );

        Ok(Response::new(GetUserResponse {
            user_id: STUB_USER_ID,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_returns_stub_token() {
        let service = AuthServiceImpl::new();
        let response = service
            .login(Request::new(UserRequest {
                username: "alice".to_string(),
            }))
            .await
            .unwrap();

        assert_eq!(response.into_inner().access_token, "123");
    }

    #[tokio::test]
    async fn login_is_repeatable() {
        let service = AuthServiceImpl::new();
        for _ in 0..2 {
            let response = service
                .login(Request::new(UserRequest {
                    username: "alice".to_string(),
                }))
                .await
                .unwrap();
            assert_eq!(response.into_inner().access_token, STUB_ACCESS_TOKEN);
        }
    }

    #[tokio::test]
    async fn get_user_ignores_requested_id() {
        let service = AuthServiceImpl::new();
        for id in [0, 42, -7, i64::MAX] {
            let response = service
                .get_user(Request::new(GetUserRequest { user_id: id }))
                .await
                .unwrap();
            assert_eq!(response.into_inner().user_id, STUB_USER_ID);
        }
    }
}
