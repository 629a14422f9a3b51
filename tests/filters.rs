use curly::{
    callable::{pass_context, pass_environment},
    environment::Finalize,
    error::Error,
    escape, Environment, Result,
};
use serde_json::{json, Value};

static NAME: &str = "filters.rs";

#[test]
fn filter_strings() -> Result<()> {
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{{ 'abc'|upper }} {{ 'ABC'|lower }} {{ 'hello world'|capitalize }} {{ '  x  '|trim }}",
        &json!({}),
    )?;
    assert_eq!("ABC abc Hello world x", &result);
    Ok(())
}

#[test]
fn filter_sequences() -> Result<()> {
    let env = Environment::new();
    let data = json!({"seq": [3, 1, 2]});
    let result = env.render_str(
        NAME,
        "{{ seq|length }} {{ seq|first }} {{ seq|last }} {{ seq|sort }} {{ seq|reverse }} {{ seq|join(', ') }}",
        &data,
    )?;
    assert_eq!("3 3 2 [1, 2, 3] [2, 1, 3] 3, 1, 2", &result);
    Ok(())
}

#[test]
fn filter_default() -> Result<()> {
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{{ missing|default('fallback') }} {{ ''|default('x', true) }} {{ 'kept'|default('x') }}",
        &json!({}),
    )?;
    assert_eq!("fallback x kept", &result);
    Ok(())
}

#[test]
fn filter_conversions() -> Result<()> {
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{{ ('42'|int) + 1 }} {{ '2.5'|float }} {{ 3|string|length }} {{ 'ab'|list }}",
        &json!({}),
    )?;
    assert_eq!("43 2.5 1 ['a', 'b']", &result);
    Ok(())
}

#[test]
fn filter_replace_and_abs() -> Result<()> {
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{{ 'a-b'|replace('-', '+') }} {{ -5|abs }}",
        &json!({}),
    )?;
    assert_eq!("a+b 5", &result);
    Ok(())
}

#[test]
fn filter_unknown_is_an_error() {
    let env = Environment::new();
    let err = env
        .render_str(NAME, "{{ 1|nosuch }}", &json!({}))
        .unwrap_err();
    assert_eq!("Filter 'nosuch' not found", err.to_string());
    assert!(matches!(err, Error::Render(_)));
}

#[test]
fn test_unknown_is_an_error() {
    let env = Environment::new();
    let err = env
        .render_str(NAME, "{{ 1 is nosuch }}", &json!({}))
        .unwrap_err();
    assert_eq!("Test 'nosuch' not found", err.to_string());
}

#[test]
fn tests_basic() -> Result<()> {
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{{ 4 is even }} {{ 4 is not odd }} {{ 9 is divisibleby 3 }} {{ x is defined }} {{ x is undefined }} {{ n is none }} {{ 'a' is string }} {{ [] is sequence }} {{ {} is mapping }} {{ 1 is eq 1 }} {{ 2 is in [1, 2] }}",
        &json!({"n": null}),
    )?;
    assert_eq!(
        "true true true false true true true true true true true",
        &result
    );
    Ok(())
}

#[test]
fn custom_filter() -> Result<()> {
    let mut env = Environment::new();
    env.add_filter("shout", |inv| {
        Ok(Value::String(format!("{}!", inv.value_string()?)))
    });
    let result =
        env.render_str(NAME, "{{ 'hey'|shout }}", &json!({}))?;
    assert_eq!("hey!", &result);
    Ok(())
}

#[test]
fn custom_filter_pass_context() -> Result<()> {
    let mut env = Environment::new();
    env.add_filter_with(
        "greet",
        pass_context(|ctx, inv| {
            let greeting = ctx
                .resolve("greeting")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "hello".to_string());
            Ok(Value::String(format!(
                "{} {}",
                greeting,
                inv.value_string()?
            )))
        }),
    );
    let result = env.render_str(
        NAME,
        "{{ 'world'|greet }}",
        &json!({"greeting": "hi"}),
    )?;
    assert_eq!("hi world", &result);
    Ok(())
}

#[test]
fn custom_test_pass_environment() -> Result<()> {
    let mut env = Environment::new();
    env.add_test_with(
        "strict_mode",
        pass_environment(|env, _inv| Ok(Value::Bool(env.strict()))),
    );
    let result = env.render_str(
        NAME,
        "{{ 1 is strict_mode }}",
        &json!({}),
    )?;
    assert_eq!("false", &result);
    Ok(())
}

#[test]
fn custom_global_function() -> Result<()> {
    let mut env = Environment::new();
    env.add_function("double", |inv| {
        let n = inv.arg(0)?.as_i64().unwrap_or(0);
        Ok(Value::from(n * 2))
    });
    env.add_global("limit", 21);
    let result =
        env.render_str(NAME, "{{ double(limit) }}", &json!({}))?;
    assert_eq!("42", &result);
    Ok(())
}

#[test]
fn auto_escape_environment_flag() -> Result<()> {
    let mut env = Environment::new();
    env.set_auto_escape(true);
    let data = json!({"html": "<b>&</b>"});
    let result = env.render_str(NAME, "{{ html }}", &data)?;
    assert_eq!("&lt;b&gt;&amp;&lt;/b&gt;", &result);
    Ok(())
}

#[test]
fn auto_escape_block_scopes_the_flag() -> Result<()> {
    let env = Environment::new();
    let data = json!({"html": "<b>"});
    let result = env.render_str(
        NAME,
        "{{ html }}|{% autoescape true %}{{ html }}{% endautoescape %}|{{ html }}",
        &data,
    )?;
    assert_eq!("<b>|&lt;b&gt;|<b>", &result);
    Ok(())
}

#[test]
fn safe_filter_bypasses_escaping() -> Result<()> {
    let mut env = Environment::new();
    env.set_auto_escape(true);
    let data = json!({"html": "<b>"});
    let result =
        env.render_str(NAME, "{{ html|safe }}", &data)?;
    assert_eq!("<b>", &result);
    Ok(())
}

#[test]
fn escape_filter_marks_safe() -> Result<()> {
    let mut env = Environment::new();
    env.set_auto_escape(true);
    let data = json!({"html": "<b>"});
    // Explicit escape then auto-escape must not double escape.
    let result = env.render_str(NAME, "{{ html|e }}", &data)?;
    assert_eq!("&lt;b&gt;", &result);
    Ok(())
}

#[test]
fn safe_values_behave_like_their_string() -> Result<()> {
    // The markup wrapper only matters to auto-escaping; every other
    // operation sees the plain string.
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{{ 'hello'|safe|length }} {{ 'x' in ('abcde'|safe) }} {{ 'c' in ('abcde'|safe) }} {{ ('a'|safe) < 'b' }} {{ ('hi'|safe) == 'hi' }}",
        &json!({}),
    )?;
    assert_eq!("5 false true true true", &result);
    Ok(())
}

#[test]
fn safe_values_iterate_as_characters() -> Result<()> {
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{% for c in 'abc'|safe %}[{{ c }}]{% endfor %}",
        &json!({}),
    )?;
    assert_eq!("[a][b][c]", &result);
    Ok(())
}

#[test]
fn empty_safe_string_is_falsy() -> Result<()> {
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{% if ''|safe %}t{% else %}f{% endif %}",
        &json!({}),
    )?;
    assert_eq!("f", &result);
    Ok(())
}

#[test]
fn escape_filter_does_not_double_escape() -> Result<()> {
    let env = Environment::new();
    let result =
        env.render_str(NAME, "{{ '<b>'|e|e }}", &json!({}))?;
    assert_eq!("&lt;b&gt;", &result);
    Ok(())
}

#[test]
fn custom_escape_function() -> Result<()> {
    let mut env = Environment::new();
    env.set_auto_escape(true);
    env.set_escape(Box::new(escape::noop));
    let data = json!({"html": "<b>"});
    let result = env.render_str(NAME, "{{ html }}", &data)?;
    assert_eq!("<b>", &result);
    Ok(())
}

#[test]
fn filter_block() -> Result<()> {
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{% filter upper %}shouting {{ word }}{% endfilter %}",
        &json!({"word": "now"}),
    )?;
    assert_eq!("SHOUTING NOW", &result);
    Ok(())
}

#[test]
fn filter_block_chain() -> Result<()> {
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{% filter trim | upper %}  ab  {% endfilter %}",
        &json!({}),
    )?;
    assert_eq!("AB", &result);
    Ok(())
}

#[test]
fn set_block_with_filter() -> Result<()> {
    let env = Environment::new();
    let result = env.render_str(
        NAME,
        "{% set x | upper %}abc{% endset %}{{ x }}",
        &json!({}),
    )?;
    assert_eq!("ABC", &result);
    Ok(())
}

#[test]
fn finalize_value_shape() -> Result<()> {
    let mut env = Environment::new();
    env.set_finalize(Finalize::value(|v| match v {
        Value::String(s) => Value::String(s.to_uppercase()),
        other => other,
    }));
    let result =
        env.render_str(NAME, "{{ 'quiet' }}", &json!({}))?;
    assert_eq!("QUIET", &result);
    Ok(())
}

#[test]
fn finalize_context_shape() -> Result<()> {
    let mut env = Environment::new();
    env.set_finalize(Finalize::with_context(|ctx, v| {
        if ctx.auto_escape() {
            v
        } else {
            match v {
                Value::Null => Value::String("-".to_string()),
                other => other,
            }
        }
    }));
    let result = env.render_str(NAME, "[{{ nothing }}]", &json!({"nothing": null}))?;
    assert_eq!("[-]", &result);
    Ok(())
}

#[test]
fn strict_mode_errors_on_missing_variable() {
    let mut env = Environment::new();
    env.set_strict(true);
    let err = env
        .render_str(NAME, "{{ missing }}", &json!({}))
        .unwrap_err();
    assert_eq!(
        "Variable 'missing' not found, check the variable path and verify the template data",
        err.to_string()
    );
}

#[test]
fn strict_mode_allows_defined_test() -> Result<()> {
    let mut env = Environment::new();
    env.set_strict(true);
    let result = env.render_str(
        NAME,
        "{{ missing is defined }}",
        &json!({}),
    )?;
    assert_eq!("false", &result);
    Ok(())
}
