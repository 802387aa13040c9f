//! The `qattempt init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("qattempt.toml").exists() {
        println!("qattempt.toml already exists, skipping.");
    } else {
        std::fs::write("qattempt.toml", SAMPLE_CONFIG)?;
        println!("Created qattempt.toml");
    }

    std::fs::create_dir_all("scenarios")?;
    for (path, content) in [
        ("scenarios/bank.toml", EXAMPLE_BANK),
        ("scenarios/example.toml", EXAMPLE_SCENARIO),
    ] {
        let path = std::path::Path::new(path);
        if path.exists() {
            println!("{} already exists, skipping.", path.display());
        } else {
            std::fs::write(path, content)?;
            println!("Created {}", path.display());
        }
    }

    println!("\nNext steps:");
    println!("  1. Run: qattempt validate --bank scenarios/bank.toml");
    println!("  2. Run: qattempt run --scenario scenarios/example.toml");
    println!("  3. Edit the bank and run: qattempt regrade --all --bank scenarios/bank.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# qattempt configuration

default_behaviour = "deferredfeedback"
clamp_negative_marks = false
regrade_parallelism = 4

[store]
type = "json"
dir = "./.qattempt/usages"
"#;

const EXAMPLE_BANK: &str = r#"[bank]
name = "Example bank"

[[questions]]
type = "truefalse"
id = "sky-blue"
name = "Sky colour"
text = "The sky is blue on a clear day."
correct_answer = true

[[questions]]
type = "multichoice"
id = "capital-fr"
name = "Capital of France"
text = "Which city is the capital of France?"
choices = [
    { text = "Paris", fraction = 1.0 },
    { text = "Lyon", fraction = 0.0, feedback = "Lyon is the third largest city." },
    { text = "Marseille", fraction = 0.0 },
]
hints = [{ text = "It is on the Seine." }]
"#;

const EXAMPLE_SCENARIO: &str = r#"[usage]
context = "example"
behaviour = "interactive"
bank = "bank.toml"
user = "student"
finish_all = true

[[slots]]
question = "sky-blue"

[[slots]]
question = "capital-fr"
max_mark = 2.0

[[actions]]
slot = 1
data = { answer = "1", "-submit" = "1" }

[[actions]]
slot = 2
data = { answer = "1", "-submit" = "1" }

[[actions]]
slot = 2
data = { "-tryagain" = "1" }

[[actions]]
slot = 2
data = { answer = "0", "-submit" = "1" }
"#;
