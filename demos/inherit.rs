extern crate log;
extern crate pretty_env_logger;

use curly::{Environment, MemoryLoader, Result};
use serde_json::json;

fn main() -> Result<()> {
    std::env::set_var("RUST_LOG", "debug");
    pretty_env_logger::init();

    let mut loader = MemoryLoader::new();
    loader.insert(
        "base.html",
        "<title>{% block title %}site{% endblock %}</title>\n<body>{% block body required %}{% endblock %}</body>",
    );
    loader.insert(
        "page.html",
        "{% extends 'base.html' %}{% block title %}{{ super() }} / page{% endblock %}{% block body %}welcome{% endblock %}",
    );

    let mut env = Environment::new();
    env.set_loader(Box::new(loader));

    let result = env.render("page.html", &json!({}))?;
    println!("{}", result);
    Ok(())
}
