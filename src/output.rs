use console::style;

fn dim(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).dim()
}

fn magenta_bold(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

/// Prints the `buildevents` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("buildevents"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitLab CI webhooks to Honeycomb traces")
    );
}
