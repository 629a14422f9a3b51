extern crate log;
extern crate pretty_env_logger;

use curly::{Environment, Result};
use serde_json::json;

fn main() -> Result<()> {
    std::env::set_var("RUST_LOG", "trace");
    pretty_env_logger::init();

    let content = "\
# {{ title }}

{% for item in list -%}
* {{ item }}{{ ' (last)' if loop.last }}
{% endfor -%}
{% for key, value in map -%}
{{ key }} = {{ value }}
{% endfor -%}
";
    let data = json!({
        "title": "Render Demo & Information",
        "list": [1, 2, 3],
        "map": {
            "apples": 1,
            "oranges": 2,
            "pears": 3,
        },
    });

    let env = Environment::new();
    let result = env.render_str("demo.md", content, &data)?;
    println!("{}", result);
    Ok(())
}
