//! Declaration files rendered for script authors.
#[cfg(test)]
mod tests {
    use std::fs;

    use scriptface::{
        declarations,
        testutils::{bridge, calculator_contract, data_processor_contract},
    };

    #[test]
    fn data_processor_declarations() {
        let bridge = bridge().unwrap();
        let text = bridge.declarations(&data_processor_contract().unwrap());

        assert!(text.starts_with("// Declarations for interface DataProcessor.\n"));
        assert!(text.contains(
            "record Person {\n    name: string,\n    age: int,\n    address: Address?,\n}\n"
        ));
        assert!(text.contains(
            "record Address {\n    street: string,\n    city: string,\n    zipCode: string,\n}\n"
        ));
        assert!(text.contains("record CalculationResult {\n"));
        assert!(text.contains("    tags: array<string>,\n"));
        assert!(text.contains("module DataProcessor_Builtins {\n"));
        assert!(text.contains("    fn validatePerson(person: Person?) -> bool;\n"));
        assert!(text.contains(
            "    fn createAddress(street: string, city: string, zipCode: string) -> Address;\n"
        ));
        assert!(text.contains("interface DataProcessor {\n"));
        assert!(text.contains("    fn processPerson(person: Person) -> CalculationResult;\n"));

        // Each record is declared once even when reached from several places.
        assert_eq!(text.matches("record Address {").count(), 1);
    }

    #[test]
    fn write_names_the_file_after_the_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge().unwrap();
        let contract = calculator_contract().unwrap();
        let path = bridge.write_declarations(dir.path(), &contract).unwrap();

        assert_eq!(path, dir.path().join("Calculator_Builtins.d.rhai"));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("    fn hostMultiply(a: int, b: int) -> int;\n"));
        assert!(text.contains("    fn divide(a: float, b: float) -> float;\n"));
        let namespace = bridge.registry().namespace("Calculator_Builtins");
        assert_eq!(
            text,
            declarations::render(&contract, namespace.map(|n| n.as_ref()))
        );
    }
}
