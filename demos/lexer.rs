use curly::{lexer, Syntax};

/// Demonstrates low-level access to the token stream.
fn main() {
    let content = "Hello {{ name }}!\n{% if admin %}*{% endif %}";
    let syntax = Syntax::default();
    for token in lexer::collect(content, &syntax, None).unwrap() {
        println!("{:#?}", token);
    }
}
