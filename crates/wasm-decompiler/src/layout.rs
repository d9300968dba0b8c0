//! Layout primitives for the pseudo-source pretty-printer.
//!
//! Rendering produces [`Value`]s: fragments of output text that know how
//! wide they are and whether they need parentheses when embedded in a
//! larger expression. The [`Layout`] combinators assemble fragments into
//! bigger ones, switching between inline and stacked forms based on a
//! soft target line width.

/// A rendered fragment: an ordered list of output lines.
///
/// Lines never contain a trailing newline; leading indentation is part of
/// the line text itself. A `Value` is deliberately move-only (no `Clone`)
/// so that a fragment cannot end up in the output twice.
#[derive(Debug)]
pub(crate) struct Value {
    pub(crate) lines: Vec<String>,
    /// Wrap in parentheses if the parent context cares about precedence.
    pub(crate) needs_bracketing: bool,
}

impl Value {
    /// A fragment with no lines at all (e.g. an empty statement list).
    pub(crate) fn empty() -> Self {
        Value { lines: Vec::new(), needs_bracketing: false }
    }

    /// A single-line fragment that needs no bracketing.
    pub(crate) fn single(line: String) -> Self {
        Value { lines: vec![line], needs_bracketing: false }
    }

    pub(crate) fn multi(lines: Vec<String>, needs_bracketing: bool) -> Self {
        Value { lines, needs_bracketing }
    }

    /// Width of the widest line.
    pub(crate) fn width(&self) -> usize {
        self.lines.iter().map(String::len).max().unwrap_or(0)
    }

    pub(crate) fn is_single_line(&self) -> bool {
        self.lines.len() == 1
    }

    /// Append text to the last line, if there is one.
    pub(crate) fn append_to_last(&mut self, text: &str) {
        if let Some(last) = self.lines.last_mut() {
            last.push_str(text);
        }
    }
}

/// Width and indentation tunables plus the wrap/indent operators.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    pub(crate) indent_amount: usize,
    pub(crate) target_exp_width: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Layout { indent_amount: 2, target_exp_width: 70 }
    }
}

impl Layout {
    pub(crate) fn indent(amount: usize) -> String {
        " ".repeat(amount)
    }

    /// Prepend indentation to every line of `val`.
    ///
    /// When `first_indent` is non-empty the first line receives it instead
    /// of plain spaces, which is how prefixes like `var x = ` end up on the
    /// same line as a multi-line child.
    pub(crate) fn indent_value(&self, val: &mut Value, amount: usize, first_indent: &str) {
        let indent = Self::indent(amount);
        for (i, line) in val.lines.iter_mut().enumerate() {
            let pad = if i == 0 && !first_indent.is_empty() { first_indent } else { indent.as_str() };
            line.insert_str(0, pad);
        }
    }

    /// Wrap `child` in a prefix and postfix.
    ///
    /// The affixes go on the child's own first/last line when the combined
    /// width stays under the target, or when both affixes are narrow enough
    /// (at most `indent_amount`) that hanging them costs nothing, so that
    /// `(`/`)` around a wide child stays attached. Otherwise the prefix
    /// becomes its own line and the child is indented under it.
    pub(crate) fn wrap_child(&self, mut child: Value, prefix: &str, postfix: &str) -> Value {
        let width = prefix.len() + postfix.len() + child.width();
        if width < self.target_exp_width
            || (prefix.len() <= self.indent_amount && postfix.len() <= self.indent_amount)
        {
            if child.is_single_line() {
                child.lines[0].insert_str(0, prefix);
                child.lines[0].push_str(postfix);
            } else {
                self.indent_value(&mut child, prefix.len(), prefix);
                child.append_to_last(postfix);
            }
        } else {
            self.indent_value(&mut child, self.indent_amount, "");
            child.lines.insert(0, prefix.to_string());
            child.append_to_last(postfix);
        }
        child
    }

    /// Parenthesize `val` if it asked for it. Idempotent.
    pub(crate) fn bracket_if_needed(&self, val: Value) -> Value {
        if !val.needs_bracketing {
            return val;
        }
        let mut bracketed = self.wrap_child(val, "(", ")");
        bracketed.needs_bracketing = false;
        bracketed
    }

    /// Render a binary expression `l infix r`.
    ///
    /// Both operands are bracketed first. The result is itself a compound
    /// expression, so it always carries `needs_bracketing`. With
    /// `indent_right` the right side is indented a level in the stacked
    /// form, used for statement-like right-hand sides such as store values.
    pub(crate) fn wrap_binary(&self, args: [Value; 2], infix: &str, indent_right: bool) -> Value {
        let [l, r] = args;
        let left = self.bracket_if_needed(l);
        let mut right = self.bracket_if_needed(r);
        let width = infix.len() + left.width() + right.width();
        if width < self.target_exp_width && left.is_single_line() && right.is_single_line() {
            let mut line = left.lines.into_iter().next().unwrap_or_default();
            line.push_str(infix);
            line.push_str(&right.lines[0]);
            return Value::multi(vec![line], true);
        }
        let mut lines = left.lines;
        if let Some(last) = lines.last_mut() {
            last.push_str(infix);
        }
        if indent_right {
            self.indent_value(&mut right, self.indent_amount, "");
        }
        lines.extend(right.lines);
        Value::multi(lines, true)
    }

    /// Render a comma-separated argument list with a prefix and postfix.
    ///
    /// Single line if everything fits; otherwise one block per argument,
    /// aligned under the prefix when the widest argument still fits there,
    /// or indented under a prefix-only line when it does not.
    pub(crate) fn wrap_nary(&self, args: Vec<Value>, prefix: &str, postfix: &str) -> Value {
        let mut total_width = 0;
        let mut max_width = 0;
        let mut multiline = false;
        for child in &args {
            let w = child.width();
            max_width = max_width.max(w);
            total_width += w;
            multiline = multiline || child.lines.len() > 1;
        }
        let commas = 2 * args.len().saturating_sub(1);
        if !multiline
            && (args.is_empty()
                || total_width + commas + prefix.len() + postfix.len() < self.target_exp_width)
        {
            let mut s = String::from(prefix);
            for (i, child) in args.iter().enumerate() {
                if i > 0 {
                    s.push_str(", ");
                }
                if let Some(line) = child.lines.first() {
                    s.push_str(line);
                }
            }
            s.push_str(postfix);
            return Value::single(s);
        }

        let mut lines = Vec::new();
        let indent_with_name = max_width + prefix.len() < self.target_exp_width;
        let count = args.len();
        for (i, mut child) in args.into_iter().enumerate() {
            let amount = if indent_with_name { prefix.len() } else { self.indent_amount };
            let first = if i == 0 && indent_with_name { prefix } else { "" };
            self.indent_value(&mut child, amount, first);
            if i + 1 < count {
                child.append_to_last(",");
            }
            lines.extend(child.lines);
        }
        if !indent_with_name {
            lines.insert(0, prefix.to_string());
        }
        let mut result = Value::multi(lines, false);
        result.append_to_last(postfix);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(lines: &[&str], nb: bool) -> Value {
        Value::multi(lines.iter().map(|s| s.to_string()).collect(), nb)
    }

    #[test]
    fn indent_value_adds_exactly_k_spaces() {
        let layout = Layout::default();
        let mut v = val(&["a", "  b"], false);
        layout.indent_value(&mut v, 3, "");
        assert_eq!(v.lines, vec!["   a", "     b"]);
    }

    #[test]
    fn indent_value_first_indent_replaces_first_line_pad() {
        let layout = Layout::default();
        let mut v = val(&["a", "b"], false);
        layout.indent_value(&mut v, 4, "x = ");
        assert_eq!(v.lines, vec!["x = a", "    b"]);
    }

    #[test]
    fn wrap_child_single_line_inline() {
        let layout = Layout::default();
        let v = layout.wrap_child(val(&["x"], false), "f(", ")");
        assert_eq!(v.lines, vec!["f(x)"]);
    }

    #[test]
    fn wrap_child_multiline_keeps_prefix_on_first_line() {
        let layout = Layout::default();
        let v = layout.wrap_child(val(&["a", "b"], false), "f(", ")");
        assert_eq!(v.lines, vec!["f(a", "  b)"]);
    }

    #[test]
    fn wrap_child_wide_prefix_goes_on_own_line() {
        let layout = Layout { indent_amount: 2, target_exp_width: 10 };
        let v = layout.wrap_child(val(&["abcdefgh"], false), "long_name(", ")");
        assert_eq!(v.lines, vec!["long_name(", "  abcdefgh)"]);
    }

    #[test]
    fn wrap_child_narrow_affixes_stay_attached_to_wide_child() {
        // Brackets are narrower than the indent width, so even an
        // over-wide child keeps them inline.
        let layout = Layout { indent_amount: 2, target_exp_width: 5 };
        let v = layout.wrap_child(val(&["abcdefghij"], false), "(", ")");
        assert_eq!(v.lines, vec!["(abcdefghij)"]);
    }

    #[test]
    fn bracket_if_needed_is_idempotent() {
        let layout = Layout::default();
        let once = layout.bracket_if_needed(val(&["a + b"], true));
        assert_eq!(once.lines, vec!["(a + b)"]);
        assert!(!once.needs_bracketing);
        let twice = layout.bracket_if_needed(once);
        assert_eq!(twice.lines, vec!["(a + b)"]);
    }

    #[test]
    fn bracket_if_needed_leaves_plain_values_alone() {
        let layout = Layout::default();
        let v = layout.bracket_if_needed(val(&["a"], false));
        assert_eq!(v.lines, vec!["a"]);
    }

    #[test]
    fn wrap_binary_inline_when_it_fits() {
        let layout = Layout::default();
        let v = layout.wrap_binary([val(&["a"], false), val(&["b"], false)], " + ", false);
        assert_eq!(v.lines, vec!["a + b"]);
        assert!(v.needs_bracketing);
    }

    #[test]
    fn wrap_binary_brackets_compound_operands() {
        let layout = Layout::default();
        let v = layout.wrap_binary([val(&["a"], false), val(&["b + c"], true)], " * ", false);
        assert_eq!(v.lines, vec!["a * (b + c)"]);
    }

    #[test]
    fn wrap_binary_stacks_when_too_wide() {
        let layout = Layout { indent_amount: 2, target_exp_width: 8 };
        let v = layout.wrap_binary(
            [val(&["aaaaaa"], false), val(&["bbbbbb"], false)],
            " + ",
            false,
        );
        assert_eq!(v.lines, vec!["aaaaaa + ", "bbbbbb"]);
        assert!(v.needs_bracketing);
    }

    #[test]
    fn wrap_binary_indents_statement_like_right_side() {
        let layout = Layout { indent_amount: 2, target_exp_width: 8 };
        let v = layout.wrap_binary(
            [val(&["target"], false), val(&["value1"], false)],
            " = ",
            true,
        );
        assert_eq!(v.lines, vec!["target = ", "  value1"]);
    }

    #[test]
    fn wrap_nary_empty_args_render_inline() {
        let layout = Layout::default();
        let v = layout.wrap_nary(Vec::new(), "f(", ")");
        assert_eq!(v.lines, vec!["f()"]);
        assert!(!v.needs_bracketing);
    }

    #[test]
    fn wrap_nary_single_line() {
        let layout = Layout::default();
        let args = vec![val(&["a"], false), val(&["b"], false), val(&["c"], false)];
        let v = layout.wrap_nary(args, "f(", ")");
        assert_eq!(v.lines, vec!["f(a, b, c)"]);
    }

    #[test]
    fn wrap_nary_aligns_args_under_prefix() {
        let layout = Layout { indent_amount: 2, target_exp_width: 12 };
        let args = vec![val(&["aaaa"], false), val(&["bbbb"], false)];
        let v = layout.wrap_nary(args, "f(", ")");
        assert_eq!(v.lines, vec!["f(aaaa,", "  bbbb)"]);
    }

    #[test]
    fn wrap_nary_wide_prefix_gets_own_line() {
        let layout = Layout { indent_amount: 2, target_exp_width: 12 };
        let args = vec![val(&["aaaa"], false), val(&["bbbb"], false)];
        let v = layout.wrap_nary(args, "long_prefix(", ")");
        assert_eq!(v.lines, vec!["long_prefix(", "  aaaa,", "  bbbb)"]);
    }

    #[test]
    fn wrap_nary_goes_multiline_when_any_child_is() {
        let layout = Layout::default();
        let args = vec![val(&["a"], false), val(&["b", "c"], false)];
        let v = layout.wrap_nary(args, "f(", ")");
        assert_eq!(v.lines, vec!["f(a,", "  b", "  c)"]);
    }
}
