use curly::{Environment, Result, Syntax};
use serde_json::json;

static NAME: &str = "delimiters.rs";

fn php_syntax() -> Syntax {
    Syntax {
        block_start: "<?".to_string(),
        block_end: "?>".to_string(),
        variable_start: "<?=".to_string(),
        variable_end: "?>".to_string(),
        comment_start: "<!--".to_string(),
        comment_end: "-->".to_string(),
        ..Default::default()
    }
}

#[test]
fn php_style_delimiters() -> Result<()> {
    let mut env = Environment::new();
    env.set_syntax(php_syntax());
    let value = "<!-- I'm a comment --><? for item in seq -?>\n    <?= item ?>\n<?- endfor ?>";
    let data = json!({"seq": [0, 1, 2, 3, 4]});
    let result = env.render_str(NAME, value, &data)?;
    assert_eq!("01234", &result);
    Ok(())
}

#[test]
fn delimiter_genericity() -> Result<()> {
    // The same template in canonical and custom sigils renders
    // identically.
    let data = json!({"seq": [1, 2, 3], "flag": true});

    let canonical = Environment::new();
    let canonical_value =
        "{# c #}{% if flag %}{% for x in seq %}{{ x }};{% endfor %}{% endif %}";
    let expected = canonical.render_str(NAME, canonical_value, &data)?;

    let mut custom = Environment::new();
    custom.set_syntax(Syntax {
        block_start: "[%".to_string(),
        block_end: "%]".to_string(),
        variable_start: "[[".to_string(),
        variable_end: "]]".to_string(),
        comment_start: "[#".to_string(),
        comment_end: "#]".to_string(),
        ..Default::default()
    });
    let custom_value =
        "[# c #][% if flag %][% for x in seq %][[ x ]];[% endfor %][% endif %]";
    let result = custom.render_str(NAME, custom_value, &data)?;

    assert_eq!(expected, result);
    assert_eq!("1;2;3;", &result);
    Ok(())
}

#[test]
fn line_statements() -> Result<()> {
    let mut env = Environment::new();
    env.syntax_mut().line_statement_prefix = Some("#".to_string());
    let value = "# for item in seq\n{{ item }},\n# endfor\n";
    let data = json!({"seq": ["a", "b"]});
    let result = env.render_str(NAME, value, &data)?;
    assert_eq!("a,\nb,\n", &result);
    Ok(())
}

#[test]
fn line_comments() -> Result<()> {
    let mut env = Environment::new();
    env.syntax_mut().line_comment_prefix = Some("##".to_string());
    let value = "a\n## ignored\nb";
    let result = env.render_str(NAME, value, &json!({}))?;
    assert_eq!("a\n\nb", &result);
    Ok(())
}

#[test]
fn environment_equivalence_is_syntax_equality() {
    let a = Environment::new();
    let b = Environment::new();
    assert!(a == b);

    let mut c = Environment::new();
    c.set_syntax(php_syntax());
    assert!(a != c);
}
