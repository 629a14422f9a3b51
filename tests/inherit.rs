use curly::{error::Error, Environment, MemoryLoader, Result};
use serde_json::json;

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
fn inherit_block_override() -> Result<()> {
    let env = environment(&[
        (
            "base.html",
            "head|{% block body %}base body{% endblock %}|foot",
        ),
        (
            "child.html",
            "{% extends 'base.html' %}{% block body %}child body{% endblock %}",
        ),
    ]);
    let result = env.render("child.html", &json!({}))?;
    assert_eq!("head|child body|foot", &result);
    Ok(())
}

#[test]
fn inherit_unoverridden_block_keeps_parent() -> Result<()> {
    let env = environment(&[
        ("base.html", "{% block a %}A{% endblock %}{% block b %}B{% endblock %}"),
        (
            "child.html",
            "{% extends 'base.html' %}{% block b %}β{% endblock %}",
        ),
    ]);
    let result = env.render("child.html", &json!({}))?;
    assert_eq!("Aβ", &result);
    Ok(())
}

#[test]
fn inherit_super_renders_parent_block() -> Result<()> {
    let env = environment(&[
        ("base.html", "{% block body %}base{% endblock %}"),
        (
            "child.html",
            "{% extends 'base.html' %}{% block body %}[{{ super() }}]{% endblock %}",
        ),
    ]);
    let result = env.render("child.html", &json!({}))?;
    assert_eq!("[base]", &result);
    Ok(())
}

#[test]
fn inherit_deep_chain_composes() -> Result<()> {
    let env = environment(&[
        ("a.html", "{% block x %}a{% endblock %}"),
        (
            "b.html",
            "{% extends 'a.html' %}{% block x %}b({{ super() }}){% endblock %}",
        ),
        (
            "c.html",
            "{% extends 'b.html' %}{% block x %}c({{ super() }}){% endblock %}",
        ),
    ]);
    let result = env.render("c.html", &json!({}))?;
    assert_eq!("c(b(a))", &result);
    Ok(())
}

#[test]
fn inherit_block_sees_root_data_but_not_locals() -> Result<()> {
    let env = environment(&[(
        "page.html",
        "{% for item in seq %}{% block cell %}<{{ title }}{{ item }}>{% endblock %}{% endfor %}",
    )]);
    let data = json!({"seq": [1, 2], "title": "t"});
    let result = env.render("page.html", &data)?;
    // The block sees template data but not the loop local.
    assert_eq!("<t><t>", &result);
    Ok(())
}

#[test]
fn inherit_scoped_block_sees_locals() -> Result<()> {
    let env = environment(&[(
        "page.html",
        "{% for item in seq %}{% block cell scoped %}<{{ item }}>{% endblock %}{% endfor %}",
    )]);
    let result = env.render("page.html", &json!({"seq": [1, 2]}))?;
    assert_eq!("<1><2>", &result);
    Ok(())
}

#[test]
fn inherit_required_block_must_be_overridden() {
    let env = environment(&[
        (
            "base.html",
            "{% block body required %}{% endblock %}",
        ),
        ("child.html", "{% extends 'base.html' %}"),
        (
            "good.html",
            "{% extends 'base.html' %}{% block body %}ok{% endblock %}",
        ),
    ]);
    let err = env.render("child.html", &json!({})).unwrap_err();
    assert!(err.to_string().contains("Required block 'body'"));
    let result = env.render("good.html", &json!({})).unwrap();
    assert_eq!("ok", &result);
}

#[test]
fn inherit_extends_cycle_detected() {
    let env = environment(&[
        ("a.html", "{% extends 'b.html' %}"),
        ("b.html", "{% extends 'a.html' %}"),
    ]);
    let err = env.render("a.html", &json!({})).unwrap_err();
    assert!(err.to_string().contains("Cycle detected"));
}

#[test]
fn include_with_context() -> Result<()> {
    let env = environment(&[
        ("partial.html", "[{{ name }}]"),
        ("page.html", "a{% include 'partial.html' %}b"),
    ]);
    let result = env.render("page.html", &json!({"name": "x"}))?;
    assert_eq!("a[x]b", &result);
    Ok(())
}

#[test]
fn include_without_context() -> Result<()> {
    let env = environment(&[
        ("partial.html", "[{{ name }}]"),
        (
            "page.html",
            "a{% include 'partial.html' without context %}b",
        ),
    ]);
    let result = env.render("page.html", &json!({"name": "x"}))?;
    assert_eq!("a[]b", &result);
    Ok(())
}

#[test]
fn include_missing_is_an_error() {
    let env = environment(&[("page.html", "{% include 'nope.html' %}")]);
    let err = env.render("page.html", &json!({})).unwrap_err();
    assert!(matches!(err, Error::TemplateNotFound(_)));
}

#[test]
fn include_ignore_missing() -> Result<()> {
    let env = environment(&[(
        "page.html",
        "a{% include 'nope.html' ignore missing %}b",
    )]);
    let result = env.render("page.html", &json!({}))?;
    assert_eq!("ab", &result);
    Ok(())
}

#[test]
fn include_first_existing_candidate() -> Result<()> {
    let env = environment(&[
        ("page.html", "{% include ['nope.html', 'real.html'] %}"),
        ("real.html", "real"),
    ]);
    let result = env.render("page.html", &json!({}))?;
    assert_eq!("real", &result);
    Ok(())
}

#[test]
fn include_cycle_detected() {
    let env = environment(&[
        ("a.html", "{% include 'b.html' %}"),
        ("b.html", "{% include 'a.html' %}"),
    ]);
    let err = env.render("a.html", &json!({})).unwrap_err();
    assert!(err.to_string().contains("Cycle detected"));
}

#[test]
fn include_renders_inherited_templates() -> Result<()> {
    let env = environment(&[
        ("base.html", "({% block x %}base{% endblock %})"),
        (
            "leaf.html",
            "{% extends 'base.html' %}{% block x %}leaf{% endblock %}",
        ),
        ("page.html", "pre {% include 'leaf.html' %} post"),
    ]);
    let result = env.render("page.html", &json!({}))?;
    assert_eq!("pre (leaf) post", &result);
    Ok(())
}
