use anyhow::Result;
use condition_compiler::ast::{CombineNode, RuleNode};
use condition_compiler::attribute::AttributeCatalog;
use condition_compiler::compiler::Compiler;
use condition_compiler::config::AppConfig;
use condition_compiler::criteria::{CriteriaBuilder, WidgetParameters};
use condition_compiler::parser::{decode_widget_conditions, parse_str};
use condition_compiler::sql_compiler::SqlCompiler;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONFIG_FILE: &str = "condition_config.json";

/// 加载配置，优先使用JSON配置文件，失败时使用默认配置
fn load_config() -> AppConfig {
    match AppConfig::from_json_file(CONFIG_FILE) {
        Ok(config) => {
            info!(file = CONFIG_FILE, attributes = config.catalog().len(), "loaded config");
            config
        }
        Err(e) => {
            warn!(error = %e, "using built-in default config");
            AppConfig::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("--- Condition Compiler: 条件树到过滤计划编译器 ---");

    let config = load_config();
    println!("\n[配置信息]:");
    println!("实体表: {} ({:?})", config.entity_table, config.dialect);
    println!("属性: {}", config.catalog().codes().join(", "));

    run_widget_demo(&config)?;
    run_repl(&config)
}

/// 演示组件参数到SQL的完整流程
fn run_widget_demo(config: &AppConfig) -> Result<()> {
    let params: WidgetParameters = serde_json::from_value(json!({
        "attribute_set_id": "4",
        "sort_by": "created_at",
        "sort_direction": "asc",
        "show_pager": "1",
        "items_count": "10",
        "conditions_encoded": "^[`1`:^[`type`:`Combine`,`aggregator`:`any`^],\
            `1--1`:^[`attribute`:`color`,`operator`:`()`,`value`:`12,13`^],\
            `1--2`:^[`attribute`:`color`,`operator`:`!()`,`value`:`14`^],\
            `1--3`:^[`attribute`:`has_image`,`operator`:`==`,`value`:`1`^]^]"
    }))?;

    println!("\n[组件条件]:");
    print_tree(&params.condition_tree(), config.catalog(), 0);

    let builder = CriteriaBuilder::new(config.catalog())
        .with_compiler_config(config.compiler_config())
        .with_default_attribute_set(config.default_attribute_set_id);

    match builder.build(&params, 2) {
        Some(criteria) => {
            println!("\n[过滤计划]:\n{}", criteria.plan);
            println!(
                "\n[排序/分页]: {} {}, 第 {} 页, 每页 {}",
                criteria.sort.field.label(),
                criteria.sort.direction,
                criteria.current_page,
                criteria.page_size
            );
            let sql = SqlCompiler::new(&config.entity_table)
                .with_dialect(config.dialect)
                .compile(&criteria);
            println!("\n[生成的 SQL]:\n{}", sql);
        }
        None => println!("组件没有可用的属性集"),
    }
    Ok(())
}

/// 交互式读取条件树，打印过滤计划和SQL
fn run_repl(config: &AppConfig) -> Result<()> {
    println!("\n输入条件树 JSON 或组件编码字符串；:attrs 列出属性，:ops <属性> 列出运算符，:quit 退出");

    let compiler = Compiler::with_config(config.catalog(), config.compiler_config());
    let sql_compiler = SqlCompiler::new(&config.entity_table).with_dialect(config.dialect);
    let mut editor = DefaultEditor::new()?;

    loop {
        let line = match editor.readline("conditions> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        match input.split_once(' ').map_or((input, ""), |(cmd, arg)| (cmd, arg.trim())) {
            (":quit" | ":q", _) => break,
            (":attrs", _) => {
                for code in config.catalog().codes() {
                    if let Some(meta) = config.catalog().get(code) {
                        println!("  {:<14} {:?}", code, meta.value_type);
                    }
                }
                continue;
            }
            (":ops", code) => {
                match config.catalog().get(code) {
                    Some(meta) => {
                        for (symbol, label) in meta.value_type.input_type().operator_options() {
                            println!("  {:<4} {}", symbol, label);
                        }
                    }
                    None => println!("未知属性: {}", code),
                }
                continue;
            }
            _ => {}
        }

        let parsed = if input.starts_with('{') || input.starts_with('[') {
            parse_str(input)
        } else {
            decode_widget_conditions(input)
        };
        let tree = match parsed {
            Ok(tree) => tree,
            Err(e) => {
                println!("✗ {}", e);
                continue;
            }
        };

        print_tree(&tree, config.catalog(), 0);
        println!("条件数: {}, 深度: {}", tree.condition_count(), tree.depth());
        let result = compiler.compile(&tree);
        for dropped in &result.dropped {
            warn!(field = %dropped.field, reason = %dropped.reason, "condition dropped");
        }

        println!("计划: {}", result.plan);
        println!("{}", serde_json::to_string_pretty(&result.plan.to_json())?);
        println!("{}", sql_compiler.compile_plan(&result.plan));
    }
    Ok(())
}

fn print_tree(node: &CombineNode, catalog: &AttributeCatalog, indent: usize) {
    println!(
        "{}If {} of these conditions are TRUE:",
        "  ".repeat(indent),
        node.aggregator.as_str().to_uppercase()
    );
    for child in &node.children {
        match child {
            RuleNode::Combine(nested) => print_tree(nested, catalog, indent + 1),
            RuleNode::Condition(condition) => println!(
                "{}- {}",
                "  ".repeat(indent + 1),
                condition.describe(catalog.get(&condition.field))
            ),
        }
    }
}
