use curly::{Environment, MemoryLoader, Result};
use serde_json::json;

static NAME: &str = "macros.rs";

fn environment(templates: &[(&str, &str)]) -> Environment {
    let mut loader = MemoryLoader::new();
    for (name, source) in templates {
        loader.insert(*name, *source);
    }
    let mut env = Environment::new();
    env.set_loader(Box::new(loader));
    env
}

#[test]
fn macro_basic() -> Result<()> {
    let env = Environment::new();
    let value = "{% macro input(name, value='') %}<input name=\"{{ name }}\" value=\"{{ value }}\">{% endmacro %}{{ input('user') }}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("<input name=\"user\" value=\"\">", &result);
    Ok(())
}

#[test]
fn macro_keyword_arguments() -> Result<()> {
    let env = Environment::new();
    let value = "{% macro pair(a, b=2) %}{{ a }}:{{ b }}{% endmacro %}{{ pair(b=9, a=1) }}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("1:9", &result);
    Ok(())
}

#[test]
fn macro_unexpected_keyword_is_an_error() {
    let env = Environment::new();
    let value =
        "{% macro pair(a) %}{{ a }}{% endmacro %}{{ pair(1, nope=2) }}";
    let err = env.render_str(NAME, value, &json!({})).unwrap_err();
    assert!(err
        .to_string()
        .contains("unexpected keyword argument 'nope'"));
}

#[test]
fn macro_scope_is_arguments_plus_globals() -> Result<()> {
    let env = Environment::new();
    // `outer` is a template local, not visible inside the macro.
    let value = "{% set outer = 'x' %}{% macro probe(a) %}{{ a }}[{{ outer }}]{% endmacro %}{{ probe(1) }}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("1[]", &result);
    Ok(())
}

#[test]
fn macro_splat_arguments() -> Result<()> {
    let env = Environment::new();
    let value = "{% macro add(a, b) %}{{ a + b }}{% endmacro %}{{ add(*pair) }}";
    let result =
        env.render_str(NAME, value, &json!({"pair": [2, 3]}))?;
    assert_eq!("5", &result);
    Ok(())
}

#[test]
fn call_block_caller() -> Result<()> {
    let env = Environment::new();
    let value = "{% macro wrap() %}<div>{{ caller() }}</div>{% endmacro %}{% call wrap() %}inner{% endcall %}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("<div>inner</div>", &result);
    Ok(())
}

#[test]
fn call_block_with_parameters() -> Result<()> {
    let env = Environment::new();
    let value = "{% macro each(items) %}{% for i in items %}{{ caller(i) }}{% endfor %}{% endmacro %}{% call(item) each(seq) %}[{{ item }}]{% endcall %}";
    let result =
        env.render_str(NAME, value, &json!({"seq": ["a", "b"]}))?;
    assert_eq!("[a][b]", &result);
    Ok(())
}

#[test]
fn call_block_sees_call_site_scope() -> Result<()> {
    let env = Environment::new();
    let value = "{% set who = 'world' %}{% macro wrap() %}{{ caller() }}{% endmacro %}{% call wrap() %}hello {{ who }}{% endcall %}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("hello world", &result);
    Ok(())
}

#[test]
fn import_namespace() -> Result<()> {
    let env = environment(&[(
        "forms.html",
        "{% macro field(name) %}<{{ name }}>{% endmacro %}",
    )]);
    let value =
        "{% import 'forms.html' as forms %}{{ forms.field('a') }}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("<a>", &result);
    Ok(())
}

#[test]
fn from_import_names_and_aliases() -> Result<()> {
    let env = environment(&[(
        "forms.html",
        "{% macro field(name) %}<{{ name }}>{% endmacro %}{% macro hint() %}?{% endmacro %}",
    )]);
    let value = "{% from 'forms.html' import field as f, hint %}{{ f('a') }}{{ hint() }}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("<a>?", &result);
    Ok(())
}

#[test]
fn from_import_unknown_name_is_an_error() {
    let env = environment(&[("forms.html", "nothing here")]);
    let value = "{% from 'forms.html' import missing %}";
    let err = env.render_str(NAME, value, &json!({})).unwrap_err();
    assert!(err.to_string().contains("cannot import name 'missing'"));
}

#[test]
fn macro_result_is_safe_under_autoescape() -> Result<()> {
    let mut env = Environment::new();
    env.set_auto_escape(true);
    let value = "{% macro tag() %}<b>{{ caller() }}</b>{% endmacro %}{% call tag() %}{{ amp }}{% endcall %}";
    let result =
        env.render_str(NAME, value, &json!({"amp": "a & b"}))?;
    // The macro's own markup stays, interpolated content escapes.
    assert_eq!("<b>a &amp; b</b>", &result);
    Ok(())
}
