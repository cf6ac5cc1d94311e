//! Demo chains showing recovery, branches and the fail-fast mode.
//!
//! Run with: cargo run --example pipeline

use relay::{ExecutionMode, Failure, Outcome, Pipeline};

#[derive(Debug, Clone)]
struct Progress {
    text: String,
    num: u32,
    done: bool,
}

fn step(label: &'static str) -> impl Fn(Progress) -> Outcome<Progress> + Send + Sync + 'static {
    move |p| {
        Ok(Progress {
            text: format!("{} {}", p.text, label),
            num: p.num + 2,
            done: p.done,
        })
    }
}

fn run(mode: ExecutionMode) -> Outcome<Progress> {
    let inject = Pipeline::from(step("4th(Inject1)"))
        .joint(step("4th(Inject2)"))
        .joint(|p: Progress| {
            Ok(Progress {
                text: format!("{} 4th(Inject3)", p.text),
                num: p.num + 2,
                done: true,
            })
        })
        .build();

    let mut chain = Pipeline::from(|x: String| Ok(x + "start"))
        .joint(|x| Ok(x + " 1st"))
        .joint(|x| Ok(x + " 2nd"))
        .joint(|_: String| {
            println!("  [cut] failing on purpose");
            Err::<String, _>(Failure::new("cut"))
        })
        .named("cut")
        .joint_recovering(
            |x| {
                Ok(Progress {
                    text: x + " 3rd",
                    num: 1,
                    done: false,
                })
            },
            |error| {
                println!("  [recover] {}", error);
                Ok("recover error".to_string())
            },
        )
        .joint(step("4th"))
        .branch(inject)
        .window(|p| println!("  [tap] {:?}", p))
        .joint(step("5th"))
        .mode(mode)
        .build();

    let result = chain.stream(String::new());

    for timing in &chain.last_trace().stages {
        println!(
            "  stage {:>2} {:<8} {:?}",
            timing.stage_index, timing.name, timing.status
        );
    }

    result
}

fn main() {
    println!("run all stages with local recovery:");
    println!("execute result {:?}\n", run(ExecutionMode::RunAll));

    println!("stop on first failure:");
    println!("execute result {:?}", run(ExecutionMode::FailFast));
}
