// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use crate::*;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

// Helper function to create an engine over in-memory templates for tests
fn create_engine(loader: MemoryLoader) -> Engine<MemoryLoader> {
    Engine::with_loader(EngineConfig::default(), loader).unwrap()
}

fn create_engine_with(config: EngineConfig, loader: MemoryLoader) -> Engine<MemoryLoader> {
    Engine::with_loader(config, loader).unwrap()
}

fn render_str(source: &str, data: Value) -> String {
    create_engine(MemoryLoader::new())
        .render_string(source, &data)
        .unwrap()
        .into_string()
}

#[cfg(test)]
mod output_tests {
    use super::*;

    #[test]
    fn test_text_only_template_is_unchanged() {
        let source = "<p>No tags here.</p>\n  \"quoted\" \\ backslash\ttab\n";
        assert_eq!(render_str(source, json!({})), source);
    }

    #[test]
    fn test_interpolation() {
        assert_eq!(render_str("Hello {{ name }}", json!({ "name": "World" })), "Hello World");
    }

    #[test]
    fn test_nul_before_digit_is_unchanged() {
        let source = "a\u{0}1b";
        assert_eq!(render_str(source, json!({})).as_bytes(), &[97, 0, 49, 98]);
    }

    #[test]
    fn test_multiline_code_keeps_long_string() {
        assert_eq!(render_str("{% s = [[a\nb]] %}{! s !}", json!({})), "a\nb");
        assert_eq!(
            render_str("{% if true then\n  t = [[x\n  y]]\nend %}{! t !}", json!({})),
            "x\n  y"
        );
    }

    #[test]
    fn test_output_is_escaped() {
        assert_eq!(
            render_str("{{ html }}", json!({ "html": "<script>" })),
            "&lt;script&gt;"
        );
    }

    #[test]
    fn test_raw_output_bypasses_escape() {
        assert_eq!(
            render_str("{! html !}", json!({ "html": "<b>bold</b>" })),
            "<b>bold</b>"
        );
    }

    #[test]
    fn test_auto_escape_disabled() {
        let engine = create_engine_with(
            EngineConfig::default().with_auto_escape(false),
            MemoryLoader::new(),
        );
        let html = engine
            .render_string("{{ html }}", &json!({ "html": "<i>" }))
            .unwrap();
        assert_eq!(html.to_string(), "<i>");
    }

    #[test]
    fn test_filter_chain_runs_left_to_right() {
        assert_eq!(
            render_str("{{ text | upper | trim }}", json!({ "text": "  hello  " })),
            "HELLO"
        );
        assert_eq!(
            render_str("{{ text | trim | truncate(3) }}", json!({ "text": " abcdef " })),
            "abc..."
        );
    }

    #[test]
    fn test_filter_arguments_and_quoted_pipes() {
        assert_eq!(
            render_str("{{ items | join(\" | \") }}", json!({ "items": ["a", "b"] })),
            "a | b"
        );
        assert_eq!(render_str("{{ missing | default(\"n/a\") }}", json!({})), "n/a");
    }

    #[test]
    fn test_nil_renders_empty() {
        assert_eq!(render_str("[{{ nothing }}]", json!({ "nothing": null })), "[]");
    }

    #[test]
    fn test_comments_are_stripped() {
        assert_eq!(render_str("a{# hidden #}b", json!({})), "ab");
    }

    #[test]
    fn test_delimiter_tie_break_prefers_comment() {
        let delimiters = Delimiters {
            comment: ("{{#".to_string(), "#}}".to_string()),
            ..Delimiters::default()
        };
        let engine = create_engine_with(
            EngineConfig::default().with_delimiters(delimiters),
            MemoryLoader::new(),
        );
        let html = engine
            .render_string("a{{# note #}}b{{ x }}", &json!({ "x": 1 }))
            .unwrap();
        assert_eq!(html.to_string(), "ab1");
    }

    #[test]
    fn test_custom_delimiters() {
        let delimiters = Delimiters {
            output: ("[[".to_string(), "]]".to_string()),
            ..Delimiters::default()
        };
        let engine = create_engine_with(
            EngineConfig::default().with_delimiters(delimiters),
            MemoryLoader::new(),
        );
        let html = engine
            .render_string("[[ name ]] {{ name }}", &json!({ "name": "x" }))
            .unwrap();
        assert_eq!(html.to_string(), "x {{ name }}");
    }
}

#[cfg(test)]
mod control_flow_tests {
    use super::*;

    #[test]
    fn test_for_in_literal_list() {
        assert_eq!(
            render_str("{% for x in {\"a\",\"b\",\"c\"} %}{{ x }},{% end %}", json!({})),
            "a,b,c,"
        );
    }

    #[test]
    fn test_for_in_indexed_iterable() {
        assert_eq!(
            render_str(
                "{% for x in rows[2] %}{{ x }}{% endfor %}",
                json!({ "rows": [[1], [2, 3]] })
            ),
            "23"
        );
    }

    #[test]
    fn test_for_in_iterator_function() {
        let source = "{% function twice() local n = 0 return function() n = n + 1 if n <= 2 then return n, n * 10 end end end %}\
                      {% for i, v in twice() %}{{ v }};{% end %}";
        assert_eq!(render_str(source, json!({})), "10;20;");
    }

    #[test]
    fn test_keywords_inside_strings() {
        let source = "{% if word == \"then\" %}yes{% end %}{% while word ~= \"do\" %}{% word = \"do\" %}{% end %}{{ word }}";
        assert_eq!(render_str(source, json!({ "word": "then" })), "yesdo");
    }

    #[test]
    fn test_numeric_for_loop() {
        assert_eq!(render_str("{% for i = 1, 3 do %}{{ i }}{% end %}", json!({})), "123");
    }

    #[test]
    fn test_for_in_list() {
        assert_eq!(
            render_str(
                "{% for item in items %}{{ item }},{% endfor %}",
                json!({ "items": ["a", "b", "c"] })
            ),
            "a,b,c,"
        );
    }

    #[test]
    fn test_for_in_missing_list_renders_nothing() {
        assert_eq!(
            render_str("[{% for item in items %}{{ item }}{% end-for %}]", json!({})),
            "[]"
        );
    }

    #[test]
    fn test_if_false_without_else() {
        assert_eq!(render_str("{% if false %}never{% endif %}", json!({})), "");
    }

    #[test]
    fn test_elseif_picks_first_true_branch() {
        let source = "{% if n == 1 %}one{% elseif n >= 2 %}two+{% elseif n == 3 %}three{% else %}none{% endif %}";
        assert_eq!(render_str(source, json!({ "n": 3 })), "two+");
        assert_eq!(render_str(source, json!({ "n": 1 })), "one");
        assert_eq!(render_str(source, json!({ "n": 0 })), "none");
    }

    #[test]
    fn test_else_if_spelling() {
        let source = "{% if a %}a{% else if b %}b{% end %}";
        assert_eq!(render_str(source, json!({ "a": false, "b": true })), "b");
    }

    #[test]
    fn test_code_assignments_are_local_to_render() {
        let source = "{% total = 0 %}{% for _, n in ipairs(nums) do total = total + n end %}{{ total }}";
        assert_eq!(render_str(source, json!({ "nums": [1, 2, 3] })), "6");
    }

    #[test]
    fn test_json_global_in_code() {
        assert_eq!(
            render_str("{! json.encode(config) !}", json!({ "config": { "a": 1 } })),
            r#"{"a":1}"#
        );
    }
}

#[cfg(test)]
mod inheritance_tests {
    use super::*;

    fn layout_loader() -> MemoryLoader {
        MemoryLoader::new()
            .with(
                "layouts/main.vein",
                "<title>{% block title %}Default{% endblock %}</title>\
                 <main>{% block content %}{% endblock %}</main>\
                 <footer>{% block footer %}(c){% endblock %}</footer>",
            )
            .with(
                "page",
                "{% extends \"main\" %}ignored{% block content %}Hello {{ name }}{% endblock %}",
            )
    }

    #[test]
    fn test_child_overrides_only_content() {
        let engine = create_engine(layout_loader());
        let html = engine.render("page", &json!({ "name": "Ada" })).unwrap();
        assert_eq!(
            html.to_string(),
            "<title>Default</title><main>Hello Ada</main><footer>(c)</footer>"
        );
    }

    #[test]
    fn test_multi_level_chain_keeps_deepest_block() {
        let loader = layout_loader()
            .with(
                "layouts/section.vein",
                "{% extends \"main\" %}{% block title %}Section{% endblock %}{% block content %}section body{% endblock %}",
            )
            .with(
                "article",
                "{% extends \"section\" %}{% block content %}article body{% endblock %}",
            );
        let engine = create_engine(loader);
        let html = engine.render("article", &json!({})).unwrap();
        assert_eq!(
            html.to_string(),
            "<title>Section</title><main>article body</main><footer>(c)</footer>"
        );
    }

    #[test]
    fn test_extends_cycle_is_detected() {
        let loader = MemoryLoader::new()
            .with("a", "{% extends \"b\" %}")
            .with("b", "{% extends \"a\" %}");
        let engine = create_engine_with(
            EngineConfig::default().with_max_inheritance_depth(4),
            loader,
        );
        match engine.render("a", &json!({})) {
            Err(VeinError::ExtendsCycle { depth, .. }) => assert_eq!(depth, 4),
            other => panic!("expected ExtendsCycle, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_layout_is_not_found() {
        let engine = create_engine(MemoryLoader::new().with("page", "{% extends \"nope\" %}"));
        assert!(matches!(
            engine.render("page", &json!({})),
            Err(VeinError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn test_mismatched_endblock_is_invalid_directive() {
        let err = create_engine(MemoryLoader::new())
            .render_string("line\n{% endblock %}", &json!({}))
            .unwrap_err();
        match err {
            VeinError::InvalidDirective { line, .. } => assert_eq!(line, 2),
            other => panic!("expected InvalidDirective, got {other:?}"),
        }
    }
}

#[cfg(test)]
mod include_tests {
    use super::*;

    #[test]
    fn test_include_name_from_call_expression() {
        let loader = MemoryLoader::new()
            .with("nav", "[{{ title }}:{{ active }}]")
            .with(
                "page",
                "{% function pick(a, b) return a end %}{@ pick(\"nav\", \"footer\") { active = \"home\" } @}",
            );
        let engine = create_engine(loader);
        let html = engine.render("page", &json!({ "title": "T" })).unwrap();
        assert_eq!(html.to_string(), "[T:home]");
    }

    #[test]
    fn test_include_with_data() {
        let loader = MemoryLoader::new()
            .with("nav", "[{{ title }}:{{ active }}]")
            .with("page", "{@ include \"nav\" { active = \"home\" } @}{{ title }}");
        let engine = create_engine(loader);
        let html = engine.render("page", &json!({ "title": "T" })).unwrap();
        assert_eq!(html.to_string(), "[T:home]T");
    }

    #[test]
    fn test_include_sees_only_caller_data() {
        let loader = MemoryLoader::new()
            .with("nav", "{{ secret or \"none\" }}")
            .with("page", "{% secret = \"x\" %}{@ include \"nav\" @}");
        let engine = create_engine(loader);
        assert_eq!(engine.render("page", &json!({})).unwrap().to_string(), "none");
    }

    #[test]
    fn test_include_inside_child_does_not_inherit_extends() {
        let loader = MemoryLoader::new()
            .with("layouts/main.vein", "<body>{% block content %}{% endblock %}</body>")
            .with("nav", "<nav/>")
            .with(
                "page",
                "{% extends \"main\" %}{% block content %}{@ include \"nav\" @}{% endblock %}",
            );
        let engine = create_engine(loader);
        assert_eq!(
            engine.render("page", &json!({})).unwrap().to_string(),
            "<body><nav/></body>"
        );
    }

    #[test]
    fn test_partial_uses_partials_root() {
        let loader = MemoryLoader::new()
            .with("partials/card.vein", "<li>{{ name }}</li>")
            .with("card", "wrong root")
            .with(
                "list",
                "{% for _, item in ipairs(items) do %}{> partial(\"card\", item) >}{% end %}",
            );
        let engine = create_engine(loader);
        let html = engine
            .render("list", &json!({ "items": [{ "name": "a" }, { "name": "b" }] }))
            .unwrap();
        assert_eq!(html.to_string(), "<li>a</li><li>b</li>");
    }

    #[test]
    fn test_include_depth_is_bounded() {
        let loader = MemoryLoader::new().with("loop", "x{@ include \"loop\" @}");
        let engine = create_engine_with(EngineConfig::default().with_max_include_depth(5), loader);
        match engine.render("loop", &json!({})) {
            Err(VeinError::RenderError { message, .. }) => {
                assert!(message.contains("include depth exceeded 5"), "{message}")
            }
            other => panic!("expected RenderError, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_include_propagates_not_found() {
        let engine = create_engine(MemoryLoader::new().with("page", "{@ include \"ghost\" @}"));
        match engine.render("page", &json!({})) {
            Err(VeinError::TemplateNotFound { name, .. }) => assert_eq!(name, "ghost"),
            other => panic!("expected TemplateNotFound, got {other:?}"),
        }
    }
}

#[cfg(test)]
mod component_tests {
    use super::*;

    fn card_engine() -> Engine<MemoryLoader> {
        let mut engine = create_engine(
            MemoryLoader::new().with("components/alert.vein", "<p class=\"alert\">{! slot !}</p>"),
        );
        engine
            .component(
                "card",
                Component::Template(
                    "<div><h2>{% slot header %}Untitled{% endslot %}</h2>{! slot !}</div>".to_string(),
                ),
            )
            .unwrap();
        engine
            .component(
                "stars",
                Component::function(|props: &Value| {
                    Ok("*".repeat(props["n"].as_u64().unwrap_or(0) as usize))
                }),
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_slot_default() {
        let html = card_engine()
            .render_string("{% component \"card\" %}Body{% endcomponent %}", &json!({}))
            .unwrap();
        assert_eq!(html.to_string(), "<div><h2>Untitled</h2>Body</div>");
    }

    #[test]
    fn test_slot_override() {
        let html = card_engine()
            .render_string(
                "{% component \"card\" {} %}{% slot header %}{{ title }}{% endslot %}Body{% endcomponent %}",
                &json!({ "title": "A & B" }),
            )
            .unwrap();
        assert_eq!(html.to_string(), "<div><h2>A &amp; B</h2>Body</div>");
    }

    #[test]
    fn test_function_component() {
        let html = card_engine()
            .render_string("{% component \"stars\" { n = 3 } %}{% endcomponent %}", &json!({}))
            .unwrap();
        assert_eq!(html.to_string(), "***");
    }

    #[test]
    fn test_component_loaded_from_components_root() {
        let html = card_engine()
            .render_string("{% component \"alert\" %}Careful{% endcomponent %}", &json!({}))
            .unwrap();
        assert_eq!(html.to_string(), "<p class=\"alert\">Careful</p>");
    }

    #[test]
    fn test_function_component_error_is_render_error() {
        let mut engine = card_engine();
        engine
            .component(
                "broken",
                Component::function(|_: &Value| Err(VeinError::function("broken", "no props"))),
            )
            .unwrap();
        let err = engine
            .render_string("{% component \"broken\" %}{% endcomponent %}", &json!({}))
            .unwrap_err();
        assert!(matches!(err, VeinError::RenderError { .. }));
    }

    #[test]
    fn test_unclosed_component_is_invalid_directive() {
        let err = card_engine()
            .render_string("{% component \"card\" %}body", &json!({}))
            .unwrap_err();
        assert!(matches!(err, VeinError::InvalidDirective { .. }));
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    #[test]
    fn test_custom_filter() {
        let mut engine = create_engine(MemoryLoader::new());
        engine
            .filter("shout", |value: &Value, args: &[Value]| -> Result<Value> {
                let mark = args.first().and_then(Value::as_str).unwrap_or("!");
                Ok(json!(format!("{}{}", filters::display_value(value), mark)))
            })
            .unwrap();
        let html = engine
            .render_string("{{ word | shout }} {{ word | shout(\"?\") }}", &json!({ "word": "hey" }))
            .unwrap();
        assert_eq!(html.to_string(), "hey! hey?");
    }

    #[test]
    fn test_invalid_filter_name_is_rejected() {
        let mut engine = create_engine(MemoryLoader::new());
        let result = engine.filter("not valid", |v: &Value, _: &[Value]| -> Result<Value> { Ok(v.clone()) });
        assert!(matches!(result, Err(VeinError::Config(_))));
    }

    #[test]
    fn test_unknown_filter_is_render_error() {
        let err = create_engine(MemoryLoader::new())
            .render_string("{{ x | nope }}", &json!({ "x": 1 }))
            .unwrap_err();
        assert!(matches!(err, VeinError::RenderError { .. }));
    }

    #[test]
    fn test_helper() {
        let mut engine = create_engine(MemoryLoader::new());
        engine
            .helper("double", |args: &[Value]| -> Result<Value> {
                Ok(json!(args.first().and_then(Value::as_i64).unwrap_or(0) * 2))
            })
            .unwrap();
        let html = engine.render_string("{{ double(21) }}", &json!({})).unwrap();
        assert_eq!(html.to_string(), "42");
    }

    #[test]
    fn test_data_overrides_globals() {
        let mut engine = create_engine_with(
            EngineConfig::default().with_global("site", json!("Config")),
            MemoryLoader::new(),
        );
        assert_eq!(engine.render_string("{{ site }}", &json!({})).unwrap().to_string(), "Config");

        engine.global("site", json!("Vein")).unwrap();
        assert_eq!(engine.render_string("{{ site }}", &json!({})).unwrap().to_string(), "Vein");
        assert_eq!(
            engine
                .render_string("{{ site }}", &json!({ "site": "Mine" }))
                .unwrap()
                .to_string(),
            "Mine"
        );
    }

    #[test]
    fn test_sandbox_blocks_io() {
        let err = create_engine(MemoryLoader::new())
            .render_string("{% io.open(\"/etc/passwd\") %}", &json!({}))
            .unwrap_err();
        assert!(matches!(err, VeinError::RenderError { .. }));
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_unclosed_tag() {
        let err = create_engine(MemoryLoader::new())
            .render_string("{{ name", &json!({}))
            .unwrap_err();
        assert!(matches!(err, VeinError::UnclosedTag { kind: TokenKind::Output, .. }));
    }

    #[test]
    fn test_malformed_filter() {
        let err = create_engine(MemoryLoader::new())
            .render_string("{{ x | }}", &json!({}))
            .unwrap_err();
        assert!(matches!(err, VeinError::InvalidFilterSyntax { .. }));
    }

    #[test]
    fn test_render_error_is_generic_without_debug() {
        let err = create_engine(MemoryLoader::new())
            .render_string("line one\n{{ missing() }}", &json!({}))
            .unwrap_err();
        match err {
            VeinError::RenderError {
                message,
                source_context,
                ..
            } => {
                assert_eq!(message, "template render error: <string>");
                assert!(source_context.is_none());
            }
            other => panic!("expected RenderError, got {other:?}"),
        }
    }

    #[test]
    fn test_render_error_is_detailed_in_debug() {
        let engine = create_engine_with(EngineConfig::default().with_debug(true), MemoryLoader::new());
        let err = engine
            .render_string("line one\n{{ missing() }}", &json!({}))
            .unwrap_err();
        match err {
            VeinError::RenderError {
                message,
                position,
                source_context,
                ..
            } => {
                assert!(message.contains("attempt to call a nil value"), "{message}");
                assert_eq!(position.map(|p| p.line), Some(2));
                assert!(source_context.is_some());
            }
            other => panic!("expected RenderError, got {other:?}"),
        }
    }

    #[test]
    fn test_compile_error_attaches_code_only_in_debug() {
        let source = "{% if %}x{% end %}";

        let err = create_engine(MemoryLoader::new())
            .render_string(source, &json!({}))
            .unwrap_err();
        match err {
            VeinError::CompileError { message, generated, .. } => {
                assert_eq!(message, "template compile error: <string>");
                assert!(generated.is_none());
            }
            other => panic!("expected CompileError, got {other:?}"),
        }

        let engine = create_engine_with(EngineConfig::default().with_debug(true), MemoryLoader::new());
        match engine.render_string(source, &json!({})).unwrap_err() {
            VeinError::CompileError { generated, .. } => {
                assert!(generated.unwrap().contains("return function(__ctx)"));
            }
            other => panic!("expected CompileError, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_render_error_keeps_inner_template() {
        let loader = MemoryLoader::new()
            .with("inner", "{{ nope() }}")
            .with("outer", "{@ include \"inner\" @}");
        let engine = create_engine(loader);
        match engine.render("outer", &json!({})) {
            Err(VeinError::RenderError { template, .. }) => assert_eq!(template, "inner"),
            other => panic!("expected RenderError, got {other:?}"),
        }
    }
}

#[cfg(test)]
mod cache_tests {
    use super::*;

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let loader = MemoryLoader::new().with("a", "A").with("b", "B").with("c", "C");
        let engine = create_engine_with(EngineConfig::default().with_cache_limit(2), loader);

        engine.render("a", &json!({})).unwrap();
        engine.render("b", &json!({})).unwrap();
        engine.render("c", &json!({})).unwrap();

        assert!(!engine.is_cached("a"));
        assert!(engine.is_cached("b"));
        assert!(engine.is_cached("c"));

        engine.clear_cache();
        for name in ["a", "b", "c"] {
            assert!(!engine.is_cached(name));
        }
    }

    #[test]
    fn test_recompiling_is_idempotent() {
        let engine = create_engine(MemoryLoader::new());
        let source = "{% for i = 1, n do %}{{ i * 2 }} {% end %}";
        let first = engine.render_string(source, &json!({ "n": 3 })).unwrap();
        engine.clear_cache();
        let second = engine.render_string(source, &json!({ "n": 3 })).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), "2 4 6 ");
    }

    #[test]
    fn test_cache_disabled() {
        let engine = create_engine_with(
            EngineConfig::default().with_cache(false),
            MemoryLoader::new().with("a", "A"),
        );
        assert_eq!(engine.render("a", &json!({})).unwrap().to_string(), "A");
        assert!(!engine.is_cached("a"));
    }
}

#[cfg(test)]
mod metrics_tests {
    use super::*;

    fn metrics_engine() -> Engine<MemoryLoader> {
        create_engine_with(
            EngineConfig::default().with_metrics(true),
            MemoryLoader::new()
                .with("home", "{{ title | upper }}")
                .with("nav", "nav")
                .with("page", "{@ include \"nav\" @}"),
        )
    }

    #[test]
    fn test_render_counts() {
        let engine = metrics_engine();
        let mut last_total = 0.0;
        for i in 1..=3 {
            engine.render("home", &json!({ "title": "x" })).unwrap();
            let stats = engine.metrics().render_stats("home").unwrap();
            assert_eq!(stats.count, i);
            assert!(stats.total_ms >= last_total);
            last_total = stats.total_ms;
        }

        let cache = engine.metrics().cache_stats("home");
        assert_eq!(cache.misses, 1);
        assert_eq!(cache.hits, 2);

        let stats = engine.metrics().render_stats("home").unwrap();
        assert_eq!(stats.history.back().unwrap().data_keys, vec!["title"]);
        assert_eq!(engine.export_metrics().filters.get("upper"), Some(&3));
    }

    #[test]
    fn test_disabled_metrics_do_not_record() {
        let engine = metrics_engine();
        engine.render("home", &json!({})).unwrap();
        engine.metrics().disable();
        engine.render("home", &json!({})).unwrap();
        assert_eq!(engine.metrics().render_stats("home").unwrap().count, 1);
    }

    #[test]
    fn test_reset_keeps_enabled_flag() {
        let engine = metrics_engine();
        engine.render("home", &json!({})).unwrap();
        engine.reset_metrics();
        assert!(engine.metrics().render_stats("home").is_none());
        assert!(engine.metrics().is_enabled());

        engine.render("home", &json!({})).unwrap();
        assert_eq!(engine.metrics().render_stats("home").unwrap().count, 1);
    }

    #[test]
    fn test_includes_and_errors_are_recorded() {
        let engine = metrics_engine();
        engine.render("page", &json!({})).unwrap();
        let export = engine.export_metrics();
        assert_eq!(export.includes["page"]["nav"].count, 1);

        assert!(engine.render("ghost", &json!({})).is_err());
        let summary = engine.metrics().summary();
        assert_eq!(summary.total_errors, 1);
        assert_eq!(summary.errors_by_template.get("ghost"), Some(&1));
    }

    #[test]
    fn test_metrics_off_by_default() {
        let engine = create_engine(MemoryLoader::new().with("home", "hi"));
        engine.render("home", &json!({})).unwrap();
        assert!(engine.metrics().render_stats("home").is_none());
    }
}

#[cfg(test)]
mod fragment_tests {
    use super::*;

    fn fragment_engine(loader: MemoryLoader) -> Engine<MemoryLoader> {
        create_engine_with(EngineConfig::default().with_fragments(true), loader)
    }

    #[test]
    fn test_escaping_is_deferred() {
        let engine = fragment_engine(MemoryLoader::new());
        let output = engine
            .render_string("<p>{{ body }}</p>", &json!({ "body": "<b>" }))
            .unwrap();
        let fragment = output.as_fragment().unwrap().clone();

        assert_eq!(
            fragment.parts(),
            &[
                Part::Raw { value: "<p>".to_string() },
                Part::Text { value: "<b>".to_string() },
                Part::Raw { value: "</p>".to_string() },
            ]
        );
        assert_eq!(fragment.to_string(), "<p>&lt;b&gt;</p>");

        let shout = |s: &str| s.to_uppercase();
        let options = FragmentOptions {
            escape: Some(&shout),
            ..FragmentOptions::default()
        };
        assert_eq!(fragment.serialize(&options), "<p><B></p>");
    }

    #[test]
    fn test_includes_splice_parts() {
        let engine = fragment_engine(
            MemoryLoader::new()
                .with("item", "<li>{{ name }}</li>")
                .with("list", "<ul>{@ include \"item\" @}</ul>"),
        );
        let output = engine.render("list", &json!({ "name": "a&b" })).unwrap();
        let fragment = output.as_fragment().unwrap();
        assert!(fragment
            .find(|part| matches!(part, Part::Text { value } if value == "a&b"))
            .is_some());
        assert_eq!(output.to_string(), "<ul><li>a&amp;b</li></ul>");
    }

    #[test]
    fn test_unfilled_slot_is_placeholder() {
        let engine = fragment_engine(MemoryLoader::new());
        let output = engine
            .render_string("{% slot sidebar %}<aside/>{% endslot %}", &json!({}))
            .unwrap();
        assert_eq!(
            output.as_fragment().unwrap().parts(),
            &[Part::Slot {
                name: "sidebar".to_string(),
                default: "<aside/>".to_string()
            }]
        );
    }

    #[test]
    fn test_blocks_are_escaped_when_joined() {
        let engine = fragment_engine(
            MemoryLoader::new()
                .with("layouts/main.vein", "<h1>{% block title %}{% endblock %}</h1>")
                .with("page", "{% extends \"main\" %}{% block title %}{{ t }}{% endblock %}"),
        );
        let output = engine.render("page", &json!({ "t": "<x>" })).unwrap();
        assert_eq!(output.to_string(), "<h1>&lt;x&gt;</h1>");
    }
}

#[cfg(test)]
mod filesystem_tests {
    use super::*;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_filesystem_engine() {
        let dir = TempDir::new().unwrap();
        write(&dir, "layouts/main.vein", "<body>{% block content %}{% endblock %}</body>");
        write(&dir, "partials/user.vein", "<b>{{ name }}</b>");
        write(&dir, "components/badge.vein", "<span>{! slot !}</span>");
        write(
            &dir,
            "users/show.vein",
            "{% extends \"main\" %}{% block content %}{> partial \"user\" user >}\
             {% component \"badge\" %}new{% endcomponent %}{% endblock %}",
        );

        let engine = Engine::new(EngineConfig::default().with_views(dir.path())).unwrap();
        let html = engine
            .render("users/show", &json!({ "user": { "name": "Ada" } }))
            .unwrap();
        assert_eq!(html.to_string(), "<body><b>Ada</b><span>new</span></body>");
    }

    #[test]
    fn test_filesystem_not_found() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::new(EngineConfig::default().with_views(dir.path())).unwrap();
        match engine.render("missing", &json!({})) {
            Err(VeinError::TemplateNotFound { tried, .. }) => {
                assert_eq!(tried.last().map(String::as_str), Some("missing"));
            }
            other => panic!("expected TemplateNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_config_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, "site/index.vein", "{{ greeting }}, {{ site }}");
        write(
            &dir,
            "vein.toml",
            "views = \"site\"\n[globals]\nsite = \"Vein\"\ngreeting = \"Hi\"\n",
        );

        let config = EngineConfig::load(dir.path().join("vein.toml")).unwrap();
        let engine = Engine::new(config).unwrap();
        assert_eq!(engine.render("index", &json!({})).unwrap().to_string(), "Hi, Vein");
    }
}

#[cfg(test)]
mod concurrency_tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_engine_is_send_sync() {
        assert_send_sync::<Engine<MemoryLoader>>();
        assert_send_sync::<Engine<FileSystemLoader>>();
    }

    #[test]
    fn test_concurrent_renders() {
        let engine = create_engine_with(
            EngineConfig::default().with_metrics(true),
            MemoryLoader::new().with("greet", "Hello {{ name }}"),
        );

        std::thread::scope(|scope| {
            for i in 0..4 {
                let engine = &engine;
                scope.spawn(move || {
                    for _ in 0..10 {
                        let html = engine.render("greet", &json!({ "name": i })).unwrap();
                        assert_eq!(html.to_string(), format!("Hello {i}"));
                    }
                });
            }
        });

        assert_eq!(engine.metrics().render_stats("greet").unwrap().count, 40);
    }
}
