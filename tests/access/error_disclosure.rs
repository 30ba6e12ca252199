//! Error information-disclosure tests.
//!
//! Server-side errors are logged and replaced with a generic message;
//! client errors keep their message.

use warden::Error;

fn body_of(err: Error) -> String {
    let body = err.into_response().into_body();
    let bytes = tokio_test::block_on(http_body_util::BodyExt::collect(body))
        .unwrap()
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[test]
fn internal_error_hides_sql() {
    let body = body_of(Error::Internal(
        "Failed to query SELECT * FROM users WHERE id = 'x'".into(),
    ));
    assert!(!body.contains("SELECT"), "SQL fragment leaked to client: {body}");
    assert!(body.contains("Internal server error"), "got: {body}");
}

#[test]
fn io_error_hides_paths() {
    let io_err = std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "No such file: /etc/secret/config.toml",
    );
    let body = body_of(Error::Io(io_err));
    assert!(!body.contains("/etc/secret"), "Filesystem path leaked to client: {body}");
}

/// A failing checker lookup surfaces as a 500 without its detail.
#[test]
fn missing_service_is_generic() {
    let container = warden::Container::new();
    let err = container.resolve::<String>().unwrap_err();
    assert_eq!(err.status_code(), hyper::StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_of(err).contains("Internal server error"));
}

#[test]
fn forbidden_names_the_denied_operation() {
    let body = body_of(Error::forbidden("DELETE", "/posts/1"));
    assert_eq!(body, r#"{"error":"Forbidden: cannot DELETE /posts/1"}"#);
}
