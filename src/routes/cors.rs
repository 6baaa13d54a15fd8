use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::header::{HeaderName, HeaderValue},
    http::Method,
    middleware::Next,
    web, Error, HttpResponse,
};

use crate::config::AppConfig;

const BASE_ALLOWED_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";

/// Answers preflight requests directly and stamps CORS/no-cache headers on everything else.
pub async fn cors_handler<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error>
where
    B: MessageBody,
{
    let allowed_headers = allowed_headers(
        req.app_data::<web::Data<AppConfig>>()
            .map(|c| c.token_header.as_str())
            .unwrap_or("token"),
    );

    let mut res = if req.method() == Method::OPTIONS {
        let res = HttpResponse::Ok().finish().map_into_right_body();
        req.into_response(res)
    } else {
        next.call(req).await?.map_into_left_body()
    };

    let headers = res.headers_mut();
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("86400"),
    );
    if let Ok(value) = HeaderValue::from_str(&allowed_headers) {
        headers.insert(HeaderName::from_static("access-control-allow-headers"), value);
    }
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(
        HeaderName::from_static("pragma"),
        HeaderValue::from_static("no-cache"),
    );

    Ok(res)
}

fn allowed_headers(token_header: &str) -> String {
    format!("{}, {}", BASE_ALLOWED_HEADERS, token_header)
}
