//! Configuration written by `courier init`.

/// Starter route file: HTTP posts land in `./inbox/`, which a second route watches.
pub const STARTER_CONFIG: &str = r#"# Courier route configuration

name: courier

logging:
  level: info
  json: false

# Built-in components (all enabled by default)
components:
  memory: true
  file: true
  http: true

routes:
  # Accept HTTP posts and drop them into an inbox directory
  - id: http-to-inbox
    from: "http://127.0.0.1:8080/orders"
    steps:
      - type: log_headers
      - type: set_header
        name: CourierFileName
        value: order.json
      - type: to
        uri: "file:./inbox/"

  # Pick up files from the inbox and log them
  - id: inbox-logger
    from: "file:./inbox/"
    steps:
      - type: log_body
"#;
