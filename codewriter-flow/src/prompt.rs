//! Prompt templates for the code writer and the review crew

use crate::crew::ReviewInputs;

/// System prompt for code generation
pub const CODER_SYSTEM: &str = "You are a Senior Python Programmer.";

/// User prompt for code generation
pub fn write_code(requirement: &str) -> String {
    format!(
        "Implement a Python function that {}\n\
         Make sure the function is efficient, well-documented, and follows best practices.\n\
         Output Formatted as python code without '```'",
        requirement
    )
}

/// System prompt for the reviewer
pub const REVIEWER_SYSTEM: &str = r#"You are a Senior Python QA Engineer.
You test code written by other engineers, fix what is broken, and report a verdict.
You have two tools:
- write_file: write a file inside your workspace (relative paths only)
- run_python: run a Python file from your workspace and get its output

Always run the code before you judge it. Keep your fixes minimal."#;

/// User prompt for one review cycle
pub fn review_task(inputs: &ReviewInputs, solution_file: &str) -> String {
    format!(
        r#"# Review Request

## Requirement
{}

## Candidate Code
The code below has been saved to `{}` in your workspace.

```python
{}
```

## Instructions
1. Write a test script that imports or embeds the candidate and checks it against the requirement, including edge cases
2. Run the test script with run_python
3. If anything fails, fix the code and run the tests again

## Answer Format
When you are done, answer with a single fenced JSON block and nothing else:

```json
{{"passed": true, "code": "<the final code>", "notes": "<one short sentence>"}}
```

Set "passed" to true only if every test passed against the code you return.
"code" must be the complete code, not a diff."#,
        inputs.requirement, solution_file, inputs.code
    )
}

/// Sent when the reviewer has used up its tool rounds
pub const FINAL_ANSWER: &str =
    "You have run out of tool calls. Give your verdict now, as the fenced JSON block described above.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_code_template() {
        let prompt = write_code("sorts a list");
        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Implement a Python function that sorts a list");
        assert!(lines[1].starts_with("Make sure the function is efficient"));
        assert_eq!(lines[2], "Output Formatted as python code without '```'");
    }

    #[test]
    fn test_review_task_embeds_inputs() {
        let inputs = ReviewInputs::new("add two numbers", "def add(a, b):\n    return a + b");
        let prompt = review_task(&inputs, "solution.py");
        assert!(prompt.contains("add two numbers"));
        assert!(prompt.contains("def add(a, b):"));
        assert!(prompt.contains("`solution.py`"));
        assert!(prompt.contains(r#"{"passed": true"#));
    }
}
