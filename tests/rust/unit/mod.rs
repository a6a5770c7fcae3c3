mod path_grammar_tests;
mod statement_emission_tests;
