/// GET / - public, answers regardless of headers.
pub async fn index() -> &'static str {
    "Hello Hono!"
}
