use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    web, Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;

use crate::{
    auth::{Claims, JwtService},
    errors::AppError,
    services::ExamUser,
};

pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let jwt_service = req
                .app_data::<web::Data<JwtService>>()
                .ok_or_else(|| AppError::InternalError("JWT service not configured".to_string()))?;

            let auth_header = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

            let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
                AppError::Unauthorized("Invalid authorization header format".to_string())
            })?;

            let claims = jwt_service.validate_token(token)?;
            req.extensions_mut().insert(claims);

            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

/// Claims placed on the request by `AuthMiddleware`.
pub struct AuthenticatedUser(pub Claims);

impl AuthenticatedUser {
    pub fn exam_user(&self) -> ExamUser {
        ExamUser {
            id: self.0.sub.clone(),
            is_premium: self.0.is_premium(),
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let claims = req
            .extensions()
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()));

        ready(claims.map(AuthenticatedUser))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SubscriptionTier;
    use actix_web::{test, ResponseError};

    #[actix_rt::test]
    async fn extractor_rejects_request_without_claims() {
        let req = test::TestRequest::default().to_http_request();

        let err = AuthenticatedUser::extract(&req)
            .await
            .err()
            .expect("no claims on request");
        assert_eq!(err.status_code(), actix_web::http::StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn extractor_maps_claims_to_exam_user() {
        let req = test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(Claims::new(
            "user-1".to_string(),
            "user@example.com".to_string(),
            SubscriptionTier::Premium,
            1,
        ));

        let user = AuthenticatedUser::extract(&req)
            .await
            .expect("claims were inserted")
            .exam_user();
        assert_eq!(
            user,
            ExamUser {
                id: "user-1".to_string(),
                is_premium: true,
            }
        );
    }
}
