use tracing::trace;

use crate::ast::{Command, Expression, Node, Pipeline, Template};
use crate::error::{SourceLocation, TemplateError, TemplateResult};
use crate::value::Value;

/// Render a parsed template against a context value.
pub fn render(template: &Template, context: &Value) -> TemplateResult<String> {
    Evaluator::new(context).render(template)
}

/// Walks the template tree, tracking declared variables and the current dot.
pub struct Evaluator<'a> {
    root: &'a Value,
    variables: Vec<(String, Value)>,
}

impl<'a> Evaluator<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            // `$` always names the root context
            variables: vec![(String::new(), root.clone())],
        }
    }

    pub fn render(&mut self, template: &Template) -> TemplateResult<String> {
        let root = self.root;
        let mut output = String::new();
        self.render_nodes(&template.nodes, root, &mut output)?;
        Ok(output)
    }

    fn render_nodes(&mut self, nodes: &[Node], dot: &Value, out: &mut String) -> TemplateResult<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = self.eval_pipeline(pipeline, dot)?;
                    out.push_str(&value.to_string());
                }
                Node::If {
                    branches,
                    else_body,
                } => {
                    let mut taken = None;
                    for branch in branches {
                        if self.eval_pipeline(&branch.condition, dot)?.is_truthy() {
                            taken = Some(&branch.body);
                            break;
                        }
                    }
                    if let Some(body) = taken.or(else_body.as_ref()) {
                        self.render_nodes(body, dot, out)?;
                    }
                }
                Node::Range {
                    key,
                    value,
                    pipeline,
                    body,
                    else_body,
                } => {
                    let entries = match self.eval_pipeline(pipeline, dot)? {
                        Value::List(items) => items
                            .into_iter()
                            .enumerate()
                            .map(|(i, item)| (Value::Int(i as i64), item))
                            .collect::<Vec<_>>(),
                        Value::Map(entries) => entries
                            .into_iter()
                            .map(|(k, v)| (Value::Str(k), v))
                            .collect(),
                        other => {
                            return Err(TemplateError::mismatch(
                                format!("range can't iterate over {}", other.kind()),
                                pipeline.location,
                            ))
                        }
                    };

                    if entries.is_empty() {
                        if let Some(else_body) = else_body {
                            self.render_nodes(else_body, dot, out)?;
                        }
                        continue;
                    }

                    let mark = self.variables.len();
                    for (entry_key, element) in entries {
                        trace!(key = %entry_key, "range iteration");
                        if let Some(name) = key {
                            self.variables.push((name.clone(), entry_key));
                        }
                        if let Some(name) = value {
                            self.variables.push((name.clone(), element.clone()));
                        }
                        let rendered = self.render_nodes(body, &element, out);
                        self.variables.truncate(mark);
                        rendered?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_pipeline(&self, pipeline: &Pipeline, dot: &Value) -> TemplateResult<Value> {
        let mut result = None;
        for command in &pipeline.commands {
            result = Some(self.eval_command(command, dot, result.take())?);
        }
        result.ok_or_else(|| TemplateError::malformed("empty pipeline", pipeline.location))
    }

    fn eval_command(
        &self,
        command: &Command,
        dot: &Value,
        piped: Option<Value>,
    ) -> TemplateResult<Value> {
        let (first, rest) = command
            .args
            .split_first()
            .ok_or_else(|| TemplateError::malformed("empty command", command.location))?;

        match first {
            Expression::Function(name) => {
                let mut args = rest
                    .iter()
                    .map(|arg| self.eval_expression(arg, dot, command.location))
                    .collect::<TemplateResult<Vec<_>>>()?;
                args.extend(piped);
                call_builtin(name, args, command.location)
            }
            _ if !rest.is_empty() || piped.is_some() => Err(TemplateError::mismatch(
                "can't give argument to non-function",
                command.location,
            )),
            _ => self.eval_expression(first, dot, command.location),
        }
    }

    fn eval_expression(
        &self,
        expression: &Expression,
        dot: &Value,
        location: SourceLocation,
    ) -> TemplateResult<Value> {
        match expression {
            Expression::StringLiteral(s) => Ok(Value::Str(s.clone())),
            Expression::IntegerLiteral(i) => Ok(Value::Int(*i)),
            Expression::BoolLiteral(b) => Ok(Value::Bool(*b)),
            Expression::Dot => Ok(dot.clone()),
            Expression::Field(path) => lookup_path(dot, "", path, location),
            Expression::Variable { name, path } => {
                let base = self.variable(name).ok_or_else(|| TemplateError::UnboundVariable {
                    name: format!("${}", name),
                    location,
                })?;
                lookup_path(base, &format!("${}", name), path, location)
            }
            Expression::Function(name) => call_builtin(name, Vec::new(), location),
            Expression::Pipeline(pipeline) => self.eval_pipeline(pipeline, dot),
        }
    }

    fn variable(&self, name: &str) -> Option<&Value> {
        self.variables
            .iter()
            .rev()
            .find(|(declared, _)| declared == name)
            .map(|(_, value)| value)
    }
}

fn lookup_path(
    base: &Value,
    prefix: &str,
    path: &[String],
    location: SourceLocation,
) -> TemplateResult<Value> {
    let mut current = base;
    for (i, field) in path.iter().enumerate() {
        current = match current {
            Value::Map(_) => current.get(field).ok_or_else(|| TemplateError::UnboundVariable {
                name: format!("{}.{}", prefix, path[..=i].join(".")),
                location,
            })?,
            other => {
                return Err(TemplateError::mismatch(
                    format!("can't evaluate field {} in type {}", field, other.kind()),
                    location,
                ))
            }
        };
    }
    Ok(current.clone())
}

fn call_builtin(name: &str, args: Vec<Value>, location: SourceLocation) -> TemplateResult<Value> {
    match name {
        "eq" => {
            if args.len() < 2 {
                return Err(TemplateError::mismatch(
                    "missing argument for comparison",
                    location,
                ));
            }
            for other in &args[1..] {
                if values_equal(&args[0], other, location)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "ne" => {
            expect_arity(name, &args, 2, location)?;
            Ok(Value::Bool(!values_equal(&args[0], &args[1], location)?))
        }
        "not" => {
            expect_arity(name, &args, 1, location)?;
            Ok(Value::Bool(!args[0].is_truthy()))
        }
        "and" | "or" => {
            let want = name == "or";
            let mut last = None;
            for arg in args {
                if arg.is_truthy() == want {
                    return Ok(arg);
                }
                last = Some(arg);
            }
            last.ok_or_else(|| {
                TemplateError::mismatch(format!("wrong number of args for {}", name), location)
            })
        }
        "len" => {
            expect_arity(name, &args, 1, location)?;
            let len = match &args[0] {
                Value::Str(s) => s.len(),
                Value::List(items) => items.len(),
                Value::Map(entries) => entries.len(),
                other => {
                    return Err(TemplateError::mismatch(
                        format!("len of type {}", other.kind()),
                        location,
                    ))
                }
            };
            Ok(Value::Int(len as i64))
        }
        _ => Err(TemplateError::UndefinedFunction {
            name: name.to_string(),
            location,
        }),
    }
}

fn expect_arity(
    name: &str,
    args: &[Value],
    expected: usize,
    location: SourceLocation,
) -> TemplateResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(TemplateError::mismatch(
            format!(
                "wrong number of args for {}: want {} got {}",
                name,
                expected,
                args.len()
            ),
            location,
        ))
    }
}

fn values_equal(left: &Value, right: &Value, location: SourceLocation) -> TemplateResult<bool> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::List(_), _) | (Value::Map(_), _) | (_, Value::List(_)) | (_, Value::Map(_)) => {
            Err(TemplateError::mismatch(
                "non-comparable type in comparison",
                location,
            ))
        }
        (a, b) => Err(TemplateError::mismatch(
            format!(
                "incompatible types for comparison: {} and {}",
                a.kind(),
                b.kind()
            ),
            location,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_template;

    const QUERY: &str = "?{{ range $i, $e := .Tags }}{{ if $i }}&{{ end }}{{ $e }}=%s{{ end }} HTTP";
    const BODY: &str = concat!(
        "\"{{\"{\"}}{{ range $key, $value := .Fields }}",
        "{{if eq $value \"int\"}}{{ $key }}=%d,",
        "{{else if eq $value \"float\"}}{{ $key }}=%f,",
        "{{else if eq $value \"string\"}}{{ $key }}=%s,",
        "{{else if eq $value \"boolean\"}}{{ $key }}=%s,",
        "{{ end }}{{ end }}{{\"}\"}}\""
    );

    fn context(tags: &[&str], fields: &[(&str, &str)]) -> Value {
        Value::map([
            ("Tags", Value::list(tags.iter().copied())),
            (
                "Fields",
                Value::map(fields.iter().map(|(k, v)| (*k, Value::from(*v)))),
            ),
        ])
    }

    fn expand(source: &str, context: &Value) -> TemplateResult<String> {
        render(&parse_template(source)?, context)
    }

    #[test]
    fn test_tags_join_with_single_separator() {
        let output = expand(QUERY, &context(&["a", "b", "c"], &[])).unwrap();
        assert_eq!(output, "?a=%s&b=%s&c=%s HTTP");
    }

    #[test]
    fn test_empty_tags_leave_no_separator() {
        let output = expand(QUERY, &context(&[], &[])).unwrap();
        assert_eq!(output, "? HTTP");
    }

    #[test]
    fn test_fields_keep_order_and_trailing_comma() {
        let output = expand(BODY, &context(&[], &[("temp", "float"), ("name", "string")])).unwrap();
        assert_eq!(output, "\"{temp=%f,name=%s,}\"");
    }

    #[test]
    fn test_every_recognised_type_picks_its_specifier() {
        let fields = [
            ("on", "boolean"),
            ("count", "int"),
            ("color", "string"),
            ("temp", "float"),
        ];
        let output = expand(BODY, &context(&[], &fields)).unwrap();
        assert_eq!(output, "\"{on=%s,count=%d,color=%s,temp=%f,}\"");
    }

    #[test]
    fn test_unknown_field_type_contributes_nothing() {
        let fields = [("a", "int"), ("b", "double"), ("c", "float")];
        let output = expand(BODY, &context(&[], &fields)).unwrap();
        assert_eq!(output, "\"{a=%d,c=%f,}\"");
    }

    #[test]
    fn test_expansion_is_repeatable() {
        let template = parse_template(BODY).unwrap();
        let ctx = context(&["x"], &[("temp", "float")]);
        let first = render(&template, &ctx).unwrap();
        let second = render(&template, &ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_field_is_unbound() {
        let err = expand("{{ range .Sensors }}{{ end }}", &context(&[], &[])).unwrap_err();
        match err {
            TemplateError::UnboundVariable { name, .. } => assert_eq!(name, ".Sensors"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_variable_is_unbound() {
        let err = expand("{{ $e }}", &context(&[], &[])).unwrap_err();
        match err {
            TemplateError::UnboundVariable { name, .. } => assert_eq!(name, "$e"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_range_variables_go_out_of_scope() {
        let err = expand("{{ range $e := .Tags }}{{ end }}{{ $e }}", &context(&["a"], &[]))
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnboundVariable { .. }));
    }

    #[test]
    fn test_dot_and_root_inside_range() {
        let output = expand(
            "{{ range .Tags }}{{ . }}{{ len $.Tags }}{{ end }}",
            &context(&["a", "b"], &[]),
        )
        .unwrap();
        assert_eq!(output, "a2b2");
    }

    #[test]
    fn test_evaluator_reused_after_failed_range() {
        let ctx = context(&["a"], &[]);
        let mut evaluator = Evaluator::new(&ctx);

        let failing = parse_template("{{ range $e := .Tags }}{{ .Missing }}{{ end }}").unwrap();
        assert!(evaluator.render(&failing).is_err());

        let lookup = parse_template("{{ $e }}").unwrap();
        match evaluator.render(&lookup) {
            Err(TemplateError::UnboundVariable { name, .. }) => assert_eq!(name, "$e"),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(
            evaluator.render(&parse_template("{{ len $.Tags }}").unwrap()).unwrap(),
            "1"
        );
    }

    #[test]
    fn test_range_else_on_empty_collection() {
        let output = expand(
            "{{ range .Tags }}{{ . }}{{ else }}none{{ end }}",
            &context(&[], &[]),
        )
        .unwrap();
        assert_eq!(output, "none");
    }

    #[test]
    fn test_range_over_scalar_is_type_mismatch() {
        let ctx = Value::map([("Tags", Value::Int(3))]);
        let err = expand("{{ range .Tags }}{{ end }}", &ctx).unwrap_err();
        assert!(matches!(err, TemplateError::TypeMismatch { .. }));
    }

    #[test]
    fn test_pipe_passes_final_argument() {
        let output = expand("{{ .Tags | len }}", &context(&["a", "b", "c"], &[])).unwrap();
        assert_eq!(output, "3");
    }

    #[test]
    fn test_logic_builtins() {
        let ctx = context(&["a"], &[]);
        assert_eq!(expand("{{ and 1 \"\" }}", &ctx).unwrap(), "");
        assert_eq!(expand("{{ or 0 \"x\" }}", &ctx).unwrap(), "x");
        assert_eq!(expand("{{ not .Tags }}", &ctx).unwrap(), "false");
        assert_eq!(expand("{{ ne 1 2 }}", &ctx).unwrap(), "true");
        assert_eq!(expand("{{ eq \"b\" \"a\" \"b\" }}", &ctx).unwrap(), "true");
        assert_eq!(
            expand("{{ if and (eq 1 1) (ne \"a\" \"b\") }}yes{{ end }}", &ctx).unwrap(),
            "yes"
        );
    }

    #[test]
    fn test_comparing_int_with_string_fails() {
        let err = expand("{{ eq 1 \"1\" }}", &context(&[], &[])).unwrap_err();
        assert!(matches!(err, TemplateError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unknown_function() {
        let err = expand("{{ printf \"%d\" 1 }}", &context(&[], &[])).unwrap_err();
        match err {
            TemplateError::UndefinedFunction { name, .. } => assert_eq!(name, "printf"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_argument_to_non_function() {
        let err = expand("{{ .Tags 1 }}", &context(&[], &[])).unwrap_err();
        assert!(matches!(err, TemplateError::TypeMismatch { .. }));
    }
}
