#[cfg(test)]
mod tests {
    use formcalc_core::{Engine, ErrorKind, Value};

    fn eval(engine: &mut Engine, source: &str) -> Option<Value> {
        let outcome = engine.calculate(source);
        assert!(
            outcome.errors.is_empty(),
            "unexpected errors for {:?}: {:?}",
            source,
            outcome.errors
        );
        outcome.value
    }

    #[test]
    fn test_collation_follows_the_engine_locale() {
        // German sorts a-umlaut with a, before z; Swedish puts it after.
        let mut german = Engine::with_locale("de").unwrap();
        assert_eq!(
            eval(&mut german, "\"\u{e4}\" < \"z\""),
            Some(Value::Number(1.0))
        );

        let mut swedish = Engine::with_locale("sv").unwrap();
        assert_eq!(
            eval(&mut swedish, "\"\u{e4}\" < \"z\""),
            Some(Value::Number(0.0))
        );
    }

    #[test]
    fn test_numeric_literal_forms() {
        let mut engine = Engine::new().unwrap();
        assert_eq!(eval(&mut engine, "1e+2"), Some(Value::Number(100.0)));
        assert_eq!(eval(&mut engine, "-23.e+1"), Some(Value::Number(-230.0)));
    }

    #[test]
    fn test_string_quote_doubling() {
        let mut engine = Engine::new().unwrap();
        assert_eq!(
            eval(&mut engine, "\"foo\"\"bar\""),
            Some(Value::Text("foo\"bar".to_string()))
        );
    }

    #[test]
    fn test_arithmetic_precedence() {
        let mut engine = Engine::new().unwrap();
        assert_eq!(eval(&mut engine, "2 * 3 + 4 / 5"), Some(Value::Number(6.8)));
        assert_eq!(
            eval(&mut engine, "2 * (3 + 4) / 5"),
            Some(Value::Number(2.8))
        );
    }

    #[test]
    fn test_block_scoping() {
        let mut engine = Engine::new().unwrap();
        // Inner `var` shadows and vanishes at `end`.
        assert_eq!(
            eval(&mut engine, "var a = 1 do var a = 2 end a"),
            Some(Value::Number(1.0))
        );
        // Bare assignment writes through to the enclosing binding.
        assert_eq!(
            eval(&mut engine, "var a = 1 do a = 2 end a"),
            Some(Value::Number(2.0))
        );
    }

    #[test]
    fn test_host_function_wins_over_inner_definition() {
        let mut engine = Engine::new().unwrap();
        engine.register_function("rate", |_| Ok(Some(Value::Number(0.07))));

        let outcome = engine.calculate("func rate() do 0.99 endfunc rate()");
        assert_eq!(outcome.value, Some(Value::Number(0.07)));
    }

    #[test]
    fn test_host_function_arguments_and_state() {
        let mut engine = Engine::new().unwrap();
        engine.register_function("max2", |args| {
            let pick = |v: &Value| match v {
                Value::Number(n) => *n,
                _ => 0.0,
            };
            let a = args.first().map(pick).unwrap_or(0.0);
            let b = args.get(1).map(pick).unwrap_or(0.0);
            Ok(Some(Value::Number(a.max(b))))
        });

        // Natives persist across calculate calls; variables do not.
        assert_eq!(
            eval(&mut engine, "var a = 3 max2(a, 7)"),
            Some(Value::Number(7.0))
        );
        assert_eq!(
            engine.calculate("a").errors[0].kind,
            ErrorKind::NameNotFound
        );
        assert_eq!(eval(&mut engine, "max2(1, 2)"), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_divide_by_promoted_zero() {
        let mut engine = Engine::new().unwrap();
        for source in ["1 / 0", "1 / false", "1 / null"] {
            let outcome = engine.calculate(source);
            assert_eq!(
                outcome.errors[0].kind,
                ErrorKind::DivideByZero,
                "for {:?}",
                source
            );
        }
    }

    #[test]
    fn test_structural_errors_cross_call_boundaries() {
        let mut engine = Engine::new().unwrap();
        let outcome =
            engine.calculate("func f() do break endfunc for var i = 0 upto 3 do f() endfor");
        assert_eq!(outcome.errors[0].kind, ErrorKind::StructuralContext);

        let outcome = engine.calculate("for var i = 0 upto 10 step -1 do i endfor");
        assert_eq!(outcome.errors[0].kind, ErrorKind::DirectionalStep);
    }

    #[test]
    fn test_a_small_program_end_to_end() {
        let mut engine = Engine::new().unwrap();
        let source = "
            func tax(amount, rate) do
                amount * rate / 100
            endfunc
            var total = 0
            foreach price in (10, 20, 30) do
                total = total + price + tax(price, 10)
            endfor
            total
        ";
        assert_eq!(eval(&mut engine, source), Some(Value::Number(66.0)));
    }
}
