use curly::{Environment, Result};
use serde_json::json;

static NAME: &str = "loops.rs";

#[test]
fn loop_simple() -> Result<()> {
    let env = Environment::new();
    let value = "{% for item in seq %}{{ item }}{% endfor %}";
    let data = json!({"seq": [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]});
    let result = env.render_str(NAME, value, &data)?;
    assert_eq!("0123456789", &result);
    Ok(())
}

#[test]
fn loop_else_on_missing_sequence() -> Result<()> {
    let env = Environment::new();
    let value = "{% for item in seq %}XXX{% else %}...{% endfor %}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("...", &result);
    Ok(())
}

#[test]
fn loop_else_on_empty_sequence() -> Result<()> {
    let env = Environment::new();
    let value = "{% for item in seq %}XXX{% else %}...{% endfor %}";
    let result = env.render_str(NAME, value, &json!({"seq": []}))?;
    assert_eq!("...", &result);
    Ok(())
}

#[test]
fn loop_over_null_is_an_error() {
    let env = Environment::new();
    let value = "{% for item in seq %}{% endfor %}";
    let err = env
        .render_str(NAME, value, &json!({"seq": null}))
        .unwrap_err();
    assert!(err.to_string().contains("not iterable"));
}

#[test]
fn loop_filter() -> Result<()> {
    let env = Environment::new();
    let value =
        "{% for item in range(10) if item is even %}[{{ item }}]{% endfor %}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("[0][2][4][6][8]", &result);
    Ok(())
}

#[test]
fn loop_filter_removing_everything_runs_else() -> Result<()> {
    let env = Environment::new();
    let value =
        "{% for n in seq if n > 10 %}{{ n }}{% else %}none{% endfor %}";
    let result =
        env.render_str(NAME, value, &json!({"seq": [1, 2, 3]}))?;
    assert_eq!("none", &result);
    Ok(())
}

#[test]
fn loop_metadata() -> Result<()> {
    let env = Environment::new();
    let value = "{% for x in seq %}{{ loop.index }}:{{ loop.index0 }}:{{ loop.revindex }}:{{ loop.revindex0 }}:{{ loop.first }}:{{ loop.last }}:{{ loop.length }} {% endfor %}";
    let result =
        env.render_str(NAME, value, &json!({"seq": ["a", "b", "c"]}))?;
    assert_eq!(
        "1:0:3:2:true:false:3 2:1:2:1:false:false:3 3:2:1:0:false:true:3 ",
        &result
    );
    Ok(())
}

#[test]
fn loop_previtem_nextitem() -> Result<()> {
    let env = Environment::new();
    let value = "{% for x in seq %}({{ loop.previtem }}<{{ x }}>{{ loop.nextitem }}){% endfor %}";
    let result =
        env.render_str(NAME, value, &json!({"seq": [1, 2, 3]}))?;
    assert_eq!("(<1>2)(1<2>3)(2<3>)", &result);
    Ok(())
}

#[test]
fn loop_cycle() -> Result<()> {
    let env = Environment::new();
    let value =
        "{% for x in 'aaaa' %}{{ loop.cycle('odd', 'even') }} {% endfor %}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("odd even odd even ", &result);
    Ok(())
}

#[test]
fn loop_changed() -> Result<()> {
    let env = Environment::new();
    let value =
        "{% for x in seq %}{% if loop.changed(x) %}!{% endif %}{{ x }}{% endfor %}";
    let result =
        env.render_str(NAME, value, &json!({"seq": [1, 1, 2, 2, 3]}))?;
    assert_eq!("!11!22!3", &result);
    Ok(())
}

#[test]
fn loop_over_map_yields_pairs() -> Result<()> {
    let env = Environment::new();
    let value = "{% for k, v in map %}{{ k }}={{ v }};{% endfor %}";
    let result =
        env.render_str(NAME, value, &json!({"map": {"a": 1, "b": 2}}))?;
    assert_eq!("a=1;b=2;", &result);
    Ok(())
}

#[test]
fn loop_over_string_yields_characters() -> Result<()> {
    let env = Environment::new();
    let value = "{% for c in 'abc' %}[{{ c }}]{% endfor %}";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("[a][b][c]", &result);
    Ok(())
}

#[test]
fn loop_unpacking() -> Result<()> {
    let env = Environment::new();
    let value =
        "{% for a, b, c in seq %}{{ a }}{{ b }}{{ c }}{% endfor %}";
    let result =
        env.render_str(NAME, value, &json!({"seq": [[1, 2, 3]]}))?;
    assert_eq!("123", &result);
    Ok(())
}

#[test]
fn loop_unpacking_too_few() {
    let env = Environment::new();
    let value = "{% for a, b, c in seq %}{% endfor %}";
    let err = env
        .render_str(NAME, value, &json!({"seq": [[1, 2]]}))
        .unwrap_err();
    assert_eq!(
        "not enough values to unpack (expected 3, got 2)",
        err.to_string()
    );
}

#[test]
fn loop_unpacking_too_many() {
    let env = Environment::new();
    let value = "{% for a, b in seq %}{% endfor %}";
    let err = env
        .render_str(NAME, value, &json!({"seq": [[1, 2, 3]]}))
        .unwrap_err();
    assert_eq!(
        "too many values to unpack (expected 2)",
        err.to_string()
    );
}

#[test]
fn loop_target_not_visible_after_loop() -> Result<()> {
    let env = Environment::new();
    let value = "{% set item = 'outer' %}{% for item in seq %}{{ item }}{% endfor %}{{ item }}";
    let result =
        env.render_str(NAME, value, &json!({"seq": ["a", "b"]}))?;
    assert_eq!("abouter", &result);
    Ok(())
}

#[test]
fn loop_nested_metadata() -> Result<()> {
    let env = Environment::new();
    let value = "{% for row in table %}{%- set rowloop = loop -%}{% for cell in row -%}[{{ rowloop.index }}|{{ loop.index }}]{%- endfor %}{%- endfor %}";
    let result =
        env.render_str(NAME, value, &json!({"table": ["ab", "cd"]}))?;
    assert_eq!("[1|1][1|2][2|1][2|2]", &result);
    Ok(())
}

#[test]
fn loop_metadata_in_filter_without_loop_errors() {
    let env = Environment::new();
    let value = "{% for x in seq if loop.index > 1 %}{{ x }}{% endfor %}";
    let err = env
        .render_str(NAME, value, &json!({"seq": [1, 2]}))
        .unwrap_err();
    assert_eq!("'loop' is undefined", err.to_string());
}

#[test]
fn loop_recursive() -> Result<()> {
    let env = Environment::new();
    let value = "{% for item in tree recursive %}{{ item.name }}{% if item.children %}({{ loop(item.children) }}){% endif %}{% endfor %}";
    let data = json!({
        "tree": [
            {"name": "a", "children": [
                {"name": "b"},
                {"name": "c", "children": [{"name": "d"}]},
            ]},
            {"name": "e"},
        ]
    });
    let result = env.render_str(NAME, value, &data)?;
    assert_eq!("a(bc(d))e", &result);
    Ok(())
}

#[test]
fn loop_recursive_depth() -> Result<()> {
    let env = Environment::new();
    let value = "{% for item in tree recursive %}{{ loop.depth }}{% if item.children %}{{ loop(item.children) }}{% endif %}{% endfor %}";
    let data = json!({
        "tree": [{"name": "a", "children": [{"name": "b"}]}]
    });
    let result = env.render_str(NAME, value, &data)?;
    assert_eq!("12", &result);
    Ok(())
}
