/// Turns a method signature into a string usable as a directory name.
///
/// Strings without a `(` are assumed to be stripped already and are
/// returned unchanged.
pub fn strip_signature(signature: &str) -> String {
    if !signature.contains('(') {
        return signature.to_owned();
    }

    signature
        .chars()
        .map(|ch| match ch {
            '/' | '[' | ']' => '-',
            ';' | ' ' => '#',
            '$' => '+',
            '(' | ')' => '@',
            '<' | '>' => '=',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_maps_reserved_characters() {
        assert_eq!(
            strip_signature("void a.b.C$D.<init>(int[], java.lang.String)"),
            "void#a.b.C+D.=init=@int--,#java.lang.String@"
        );
    }

    #[test]
    fn test_already_stripped_passes_through() {
        let stripped = "void#a.b.C.m@@";
        assert_eq!(strip_signature(stripped), stripped);
        assert_eq!(strip_signature("La/b/C;"), "La/b/C;");
    }
}
